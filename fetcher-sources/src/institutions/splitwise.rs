//! Splitwise REST API, authenticated with a personal API key.

use fetcher_core::{MediaType, Period};

use super::Toolkit;
use crate::pipeline::LocatorPlan;
use crate::session::{IdentityCheck, HttpRequest, HttpSessionFactory, Locator, SessionFactory};

const API: &str = "https://secure.splitwise.com/api/v3.0";

pub(super) fn factory(toolkit: &Toolkit) -> Box<dyn SessionFactory> {
    let identity_check = IdentityCheck {
        url: format!("{API}/get_current_user"),
        identity_pointer: Some("/user/id".to_string()),
    };
    Box::new(HttpSessionFactory::new(toolkit.http.clone(), Some(identity_check)))
}

pub(super) fn request(period: &Period) -> HttpRequest {
    HttpRequest {
        url: format!("{API}/get_expenses"),
        query: vec![
            ("dated_after".to_string(), period.start.format("%Y-%m-%d").to_string()),
            ("dated_before".to_string(), period.end.succ_opt().unwrap_or(period.end).format("%Y-%m-%d").to_string()),
            ("limit".to_string(), "0".to_string()),
        ],
        media: MediaType::Json,
    }
}

pub(super) fn plan() -> LocatorPlan {
    Box::new(|period| Ok(Locator::Http(request(period))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_expense_query_is_end_inclusive() {
        let p = Period::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap();
        let r = request(&p);
        assert!(r.url.ends_with("/get_expenses"));
        assert_eq!(r.query[0], ("dated_after".to_string(), "2024-03-01".to_string()));
        assert_eq!(r.query[1], ("dated_before".to_string(), "2024-04-01".to_string()));
    }
}
