//! Viseca one. Transactions come from the card API the web app itself
//! calls, authenticated by the login cookies.

use fetcher_core::{FetchError, MediaType, Period};

use crate::pipeline::LocatorPlan;
use crate::session::{BrowserScript, Capture, HttpDecode, Locator, LoginFlow, Paging, Readiness, Selector, Submit};

const LOGIN_URL: &str = "https://one.viseca.ch/login/login";

/// Largest page the card API serves.
const PAGE_SIZE: usize = 1000;

pub(super) fn login() -> LoginFlow {
    LoginFlow {
        url: LOGIN_URL.to_string(),
        frame: None,
        username: Selector::css("#Benutzername"),
        password: Selector::css("#password"),
        submit: Submit::EnterKey,
        ready: Readiness::UrlLeaves("https://one.viseca.ch/login".to_string()),
        rejection: Some(Selector::css(".validation-summary-errors")),
    }
}

pub(super) fn script(card_id: &str, period: &Period) -> BrowserScript {
    let url = format!(
        "https://api.one.viseca.ch/v1/card/{card_id}/transactions?dateFrom={}&dateTo={}",
        period.start.format("%Y-%m-%d"),
        period.end.format("%Y-%m-%d"),
    );
    let capture = Capture::Http {
        url,
        headers: Vec::new(),
        decode: HttpDecode::Raw,
        media: MediaType::Json,
        paging: Some(Paging {
            offset_param: "offset".to_string(),
            size_param: "pagesize".to_string(),
            page_size: PAGE_SIZE,
            items: "/list".to_string(),
        }),
    };
    BrowserScript::new("viseca card transactions", Vec::new(), capture)
}

pub(super) fn plan(card_id: Option<String>) -> LocatorPlan {
    Box::new(move |period| {
        let card_id = card_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| FetchError::Configuration("viseca.card_id is not set".to_string()))?;
        Ok(Locator::Browser(script(card_id, period)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn period() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_card_id_required() {
        let err = plan(None)(&period()).unwrap_err();
        assert!(matches!(err, FetchError::Configuration(_)));
    }

    #[test]
    fn test_transactions_url() {
        let Locator::Browser(script) = plan(Some("0123ABC".into()))(&period()).unwrap() else {
            panic!("expected a browser locator");
        };
        let Capture::Http { url, paging, .. } = script.capture else {
            panic!("expected an http capture");
        };
        assert_eq!(
            url,
            "https://api.one.viseca.ch/v1/card/0123ABC/transactions?dateFrom=2024-06-01&dateTo=2024-06-30"
        );
        let paging = paging.expect("transactions are paged");
        assert_eq!((paging.offset_param.as_str(), paging.page_size), ("offset", 1000));
    }
}
