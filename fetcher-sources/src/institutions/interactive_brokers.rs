//! Interactive Brokers client portal.
//!
//! The statement endpoint wants the page's `AM_SESSION_ID` as a header and
//! answers with JSON carrying the CSV base64-encoded in `fileContent`.

use fetcher_core::{MediaType, Period};

use crate::pipeline::LocatorPlan;
use crate::session::{BrowserScript, Capture, HttpDecode, Locator, LoginFlow, Readiness, Selector, Step, Submit};

const STATEMENTS_URL: &str = "https://www.interactivebrokers.co.uk/AccountManagement/Statements/Run";

pub(super) fn login() -> LoginFlow {
    LoginFlow {
        url: "https://www.interactivebrokers.co.uk/sso/Login?RL=1".to_string(),
        frame: None,
        username: Selector::css("#user_name"),
        password: Selector::css("#password"),
        submit: Submit::EnterKey,
        ready: Readiness::Element(Selector::css("[aria-label=\"Reports\"]")),
        rejection: Some(Selector::css("#ERRORMSG")),
    }
}

fn statement_url(period: &Period) -> String {
    let (from, to) = (period.start.format("%Y%m%d"), period.end.format("%Y%m%d"));
    format!(
        "{STATEMENTS_URL}?format=13&fromDate={from}&toDate={to}&reportDate={to}&language=en\
         &period=DATE_RANGE&statementCategory=DEFAULT_STATEMENT&statementType=MTM_SUMMARY"
    )
}

pub(super) fn script(period: &Period) -> BrowserScript {
    let steps = vec![
        Step::Click(Selector::css("[aria-label=\"Reports\"]")),
        Step::WaitFor(Selector::xpath("//*[normalize-space(text()) = 'MTM Summary']")),
        Step::Script {
            script: "return AM_SESSION_ID;".to_string(),
            var: "session_id".to_string(),
        },
    ];
    let capture = Capture::Http {
        url: statement_url(period),
        headers: vec![("SessionId".to_string(), "{session_id}".to_string())],
        decode: HttpDecode::JsonBase64Field("fileContent".to_string()),
        media: MediaType::Csv,
        paging: None,
    };
    BrowserScript::new("interactive brokers statement", steps, capture)
}

pub(super) fn plan() -> LocatorPlan {
    Box::new(|period| Ok(Locator::Browser(script(period))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_statement_request() {
        let p = Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap();
        let Capture::Http { url, headers, decode, .. } = script(&p).capture else {
            panic!("expected an http capture");
        };
        assert!(url.contains("fromDate=20240101&toDate=20240331&reportDate=20240331"));
        assert!(url.contains("format=13"));
        assert_eq!(headers, vec![("SessionId".to_string(), "{session_id}".to_string())]);
        assert_eq!(decode, HttpDecode::JsonBase64Field("fileContent".to_string()));
    }
}
