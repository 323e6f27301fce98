//! Splitwise `get_expenses` JSON.
//!
//! The document's account is the id of the signed-in user; each expense is
//! reduced to that user's net balance (positive when others owe them).

use fetcher_core::{FetchError, RawDocument};
use serde::Deserialize;

use super::{first_text, StatementParser};
use crate::locale::{DateFormat, NumberFormat};
use crate::types::{Conventions, ParsedRow, ParsedStatement, SignConvention};

const FORMAT: &str = "splitwise-json";

pub const CONVENTIONS: Conventions = Conventions {
    sign: SignConvention::CreditPositive,
    date: DateFormat::IsoDateTime,
    number: NumberFormat::PLAIN,
    currency: None,
};

#[derive(Debug, Deserialize)]
struct Expenses {
    expenses: Vec<Expense>,
}

#[derive(Debug, Deserialize)]
struct Expense {
    description: Option<String>,
    currency_code: String,
    date: String,
    deleted_at: Option<String>,
    category: Option<Category>,
    #[serde(default)]
    users: Vec<Share>,
}

#[derive(Debug, Deserialize)]
struct Category {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Share {
    user_id: serde_json::Value,
    net_balance: String,
}

pub struct SplitwiseJson;

impl StatementParser for SplitwiseJson {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        let text = first_text(doc, FORMAT)?;
        let user = doc
            .account
            .as_deref()
            .ok_or_else(|| FetchError::Configuration(format!("{FORMAT}: current user id unknown")))?;
        let parsed: Expenses =
            serde_json::from_str(&text).map_err(|e| FetchError::unrecognized(format!("{FORMAT}: {e}"), &text))?;

        let mut out = ParsedStatement::new(&doc.source, CONVENTIONS);
        out.account = Some(user.to_string());
        out.period = doc.period;
        out.reference_date = Some(doc.reference_date());

        for (i, e) in parsed.expenses.into_iter().enumerate() {
            if e.deleted_at.is_some() {
                continue;
            }
            let Some(share) = e.users.iter().find(|s| user_id_matches(&s.user_id, user)) else {
                continue;
            };
            let mut row = ParsedRow::new(i + 1, e.date, share.net_balance.clone(), e.description.unwrap_or_default())
                .currency(e.currency_code);
            if let Some(name) = e.category.and_then(|c| c.name) {
                row = row.category(name);
            }
            out.rows.push(row);
        }
        Ok(out)
    }
}

fn user_id_matches(id: &serde_json::Value, user: &str) -> bool {
    match id {
        serde_json::Value::Number(n) => n.to_string() == user,
        serde_json::Value::String(s) => s == user,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_and_normalize;
    use chrono::NaiveDate;
    use fetcher_core::MediaType;

    fn doc(text: &str) -> RawDocument {
        RawDocument::single("splitwise", NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), MediaType::Json, text)
            .with_account("42")
    }

    const SAMPLE: &str = r#"{"expenses": [
  {"id": 1, "description": "Dinner", "cost": "90.0", "currency_code": "CHF", "date": "2024-01-12T19:30:00Z",
   "deleted_at": null, "category": {"id": 13, "name": "Dining out"},
   "users": [{"user_id": 42, "paid_share": "90.0", "owed_share": "30.0", "net_balance": "60.0"},
             {"user_id": 7, "paid_share": "0.0", "owed_share": "60.0", "net_balance": "-60.0"}]},
  {"id": 2, "description": "Groceries", "cost": "20.0", "currency_code": "EUR", "date": "2024-01-05T10:00:00Z",
   "deleted_at": null, "category": {"id": 12, "name": "Groceries"},
   "users": [{"user_id": 7, "paid_share": "20.0", "owed_share": "10.0", "net_balance": "10.0"},
             {"user_id": 42, "paid_share": "0.0", "owed_share": "10.0", "net_balance": "-10.0"}]},
  {"id": 3, "description": "Typo", "cost": "5.0", "currency_code": "CHF", "date": "2024-01-06T10:00:00Z",
   "deleted_at": "2024-01-07T10:00:00Z", "category": null,
   "users": [{"user_id": 42, "paid_share": "5.0", "owed_share": "0.0", "net_balance": "5.0"}]},
  {"id": 4, "description": "Not mine", "cost": "8.0", "currency_code": "CHF", "date": "2024-01-08T10:00:00Z",
   "deleted_at": null, "category": null,
   "users": [{"user_id": 7, "paid_share": "8.0", "owed_share": "8.0", "net_balance": "0.0"}]}
]}"#;

    #[test]
    fn test_net_balance_of_current_user() {
        let st = parse_and_normalize(&SplitwiseJson, &doc(SAMPLE)).unwrap();
        assert_eq!(st.transactions.len(), 2);
        assert_eq!(st.transactions[0].description, "Groceries");
        assert_eq!(st.transactions[0].amount.to_string(), "-10.0");
        assert_eq!(st.transactions[0].currency.to_string(), "EUR");
        assert_eq!(st.transactions[1].amount.to_string(), "60.0");
        assert_eq!(st.transactions[1].category.as_deref(), Some("Dining out"));
        assert_eq!(st.account.as_deref(), Some("42"));
    }

    #[test]
    fn test_unknown_user_is_configuration_error() {
        let doc = RawDocument::single("splitwise", NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), MediaType::Json, SAMPLE);
        assert!(matches!(SplitwiseJson.parse(&doc), Err(FetchError::Configuration(_))));
    }
}
