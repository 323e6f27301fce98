//! Degiro web trader. Both exports sit behind the same login; the CSV link
//! of the export dialog is fetched with the browser's cookies.

use fetcher_core::{MediaType, Period};

use crate::pipeline::LocatorPlan;
use crate::session::{BrowserScript, Capture, HttpDecode, Locator, LoginFlow, Readiness, Selector, Step, Submit};

const TRADER: &str = "https://trader.degiro.nl/trader/#";

pub(super) fn login() -> LoginFlow {
    LoginFlow {
        url: "https://trader.degiro.nl/login/chde/#/login".to_string(),
        frame: None,
        username: Selector::css("#username"),
        password: Selector::css("#password"),
        submit: Submit::EnterKey,
        ready: Readiness::UrlPrefix(format!("{TRADER}/markets")),
        rejection: Some(Selector::css("[data-name='loginForm'] [role='alert']")),
    }
}

fn account_overview_url(period: &Period) -> String {
    format!(
        "{TRADER}/account-overview?fromDate={}&toDate={}&aggregateCashFunds=true&currency=All",
        period.start.format("%Y-%m-%d"),
        period.end.format("%Y-%m-%d"),
    )
}

/// Open the export dialog and remember where its CSV link points.
fn export_steps() -> Vec<Step> {
    vec![
        Step::Click(Selector::css("[data-name=\"exportButton\"]")),
        Step::WaitFor(Selector::css("[data-name=\"reportExportForm\"]")),
        Step::ReadAttribute {
            selector: Selector::xpath("//*[@data-name='reportExportForm']//a[normalize-space(text()) = 'CSV']"),
            attribute: "href".to_string(),
            var: "csv_url".to_string(),
        },
    ]
}

fn csv_capture() -> Capture {
    Capture::Http {
        url: "{csv_url}".to_string(),
        headers: Vec::new(),
        decode: HttpDecode::Raw,
        media: MediaType::Csv,
        paging: None,
    }
}

pub(super) fn account_script(period: &Period) -> BrowserScript {
    let mut steps = vec![Step::Goto(account_overview_url(period))];
    steps.extend(export_steps());
    BrowserScript::new("degiro account overview", steps, csv_capture())
}

pub(super) fn portfolio_script() -> BrowserScript {
    let mut steps = vec![Step::Click(Selector::css("[href=\"#/portfolio\"]"))];
    steps.extend(export_steps());
    BrowserScript::new("degiro portfolio", steps, csv_capture())
}

pub(super) fn account_plan() -> LocatorPlan {
    Box::new(|period| Ok(Locator::Browser(account_script(period))))
}

/// The portfolio is a snapshot; the period is ignored.
pub(super) fn portfolio_plan() -> LocatorPlan {
    Box::new(|_| Ok(Locator::Browser(portfolio_script())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_account_overview_url_spans_period() {
        let p = Period::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
        )
        .unwrap();
        let script = account_script(&p);
        assert_eq!(
            script.steps[0],
            Step::Goto(
                "https://trader.degiro.nl/trader/#/account-overview?fromDate=2024-02-01&toDate=2024-05-03&aggregateCashFunds=true&currency=All"
                    .to_string()
            )
        );
        assert!(matches!(&script.capture, Capture::Http { url, .. } if url == "{csv_url}"));
    }
}
