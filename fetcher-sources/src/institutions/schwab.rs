//! Charles Schwab transaction history.
//!
//! The export button opens a disclaimer popup; confirming it starts the CSV
//! download. Schwab exports its own default range, so the period only
//! stamps the statement.

use fetcher_core::MediaType;

use crate::pipeline::LocatorPlan;
use crate::session::{BrowserScript, Capture, Locator, LoginFlow, Readiness, Selector, Step, Submit};

const HISTORY_URL: &str = "https://client.schwab.com/app/accounts/transactionhistory/#/";

pub(super) fn login() -> LoginFlow {
    LoginFlow {
        url: "https://client.schwab.com/Login/SignOn/CustomerCenterLogin.aspx".to_string(),
        frame: Some(Selector::css("#lmsSecondaryLogin")),
        username: Selector::css("input[placeholder=\"Login ID\"]"),
        password: Selector::css("input[type=\"password\"]"),
        submit: Submit::EnterKey,
        ready: Readiness::UrlPrefix("https://client.schwab.com/clientapps/".to_string()),
        rejection: None,
    }
}

pub(super) fn script(equity_awards: bool) -> BrowserScript {
    let mut steps = vec![Step::Goto(HISTORY_URL.to_string())];
    if equity_awards {
        steps.push(Step::Click(Selector::css("[role=\"combobox\"]")));
        steps.push(Step::Click(Selector::xpath("//a[normalize-space(text()) = 'Equity Award Center']")));
    }
    steps.push(Step::Click(Selector::css("#bttnExport button")));
    steps.push(Step::SwitchToNewestWindow);

    let capture = Capture::Download {
        trigger: Selector::css("#ctl00_WebPartManager1_wpExportDisclaimer_ExportDisclaimer_btnOk"),
        media: MediaType::Csv,
    };
    let name = if equity_awards { "schwab equity award history" } else { "schwab brokerage history" };
    BrowserScript::new(name, steps, capture)
}

pub(super) fn plan(equity_awards: bool) -> LocatorPlan {
    Box::new(move |_| Ok(Locator::Browser(script(equity_awards))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equity_awards_select_account_first() {
        let brokerage = script(false);
        let eac = script(true);
        assert_eq!(eac.steps.len(), brokerage.steps.len() + 2);
        assert_eq!(eac.steps.last(), Some(&Step::SwitchToNewestWindow));
        assert!(matches!(eac.capture, Capture::Download { media: MediaType::Csv, .. }));
    }
}
