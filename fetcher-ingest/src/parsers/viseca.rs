//! Viseca one card transactions, as served by the `one.viseca.ch` JSON API.
//! A long period arrives as several pages, one document part each.

use fetcher_core::{FetchError, RawDocument};
use serde::Deserialize;
use serde_json::value::RawValue;

use super::{part_text, StatementParser};
use crate::locale::{DateFormat, NumberFormat};
use crate::types::{Conventions, ParsedRow, ParsedStatement, SignConvention};

const FORMAT: &str = "viseca-json";

pub const CONVENTIONS: Conventions = Conventions {
    sign: SignConvention::DebitPositive,
    date: DateFormat::IsoDateTime,
    number: NumberFormat::PLAIN,
    currency: Some("CHF"),
};

#[derive(Debug, Deserialize)]
struct TransactionList {
    list: Vec<CardTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardTransaction {
    date: String,
    amount: Box<RawValue>,
    currency: Option<String>,
    merchant_name: Option<String>,
    pretty_name: Option<String>,
    #[serde(rename = "pFMCategory")]
    pfm_category: Option<Category>,
    state_type: Option<String>,
    card_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Category {
    name: Option<String>,
}

/// The amount token exactly as the API wrote it, never routed through a float.
fn amount_text(raw: &RawValue) -> String {
    let token = raw.get().trim();
    token.strip_prefix('"').and_then(|t| t.strip_suffix('"')).unwrap_or(token).to_string()
}

pub struct VisecaJson;

impl StatementParser for VisecaJson {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        if doc.parts.is_empty() {
            return Err(FetchError::unrecognized(format!("{FORMAT}: document has no parts"), ""));
        }
        let mut out = ParsedStatement::new(&doc.source, CONVENTIONS);
        out.period = doc.period;
        out.reference_date = Some(doc.reference_date());
        out.account = doc.account.clone();

        // Records are numbered across pages.
        let mut record = 0;
        for part in &doc.parts {
            let text = part_text(part, FORMAT)?;
            let page: TransactionList = serde_json::from_str(&text)
                .map_err(|e| FetchError::unrecognized(format!("{FORMAT}: {}: {e}", part.name), &text))?;
            if out.account.is_none() {
                out.account = page.list.iter().find_map(|t| t.card_id.clone());
            }

            for t in page.list {
                record += 1;
                // Pending authorisations are re-issued as booked entries later.
                if t.state_type.as_deref() != Some("booked") {
                    continue;
                }
                let description = t
                    .pretty_name
                    .filter(|s| !s.trim().is_empty())
                    .or(t.merchant_name)
                    .unwrap_or_default();
                let mut row = ParsedRow::new(record, t.date, amount_text(&t.amount), description);
                if let Some(ccy) = t.currency {
                    row = row.currency(ccy);
                }
                if let Some(name) = t.pfm_category.and_then(|c| c.name) {
                    row = row.category(name);
                }
                out.rows.push(row);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_and_normalize;
    use chrono::NaiveDate;
    use fetcher_core::{DocumentPart, MediaType};

    fn doc(text: &str) -> RawDocument {
        RawDocument::single("viseca", NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), MediaType::Json, text)
    }

    const SAMPLE: &str = r#"{
  "totalCount": 3,
  "list": [
    {"transactionId": "a", "cardId": "0123ABC", "date": "2024-01-20T18:42:11", "amount": 42.5, "currency": "CHF",
     "merchantName": "COOP-4711 ZUERICH", "prettyName": "Coop", "pFMCategory": {"id": "cv_groceries", "name": "Groceries"},
     "stateType": "booked"},
    {"transactionId": "b", "cardId": "0123ABC", "date": "2024-01-21T09:00:00", "amount": 9.9, "currency": "CHF",
     "merchantName": "SBB CFF FFS", "prettyName": null, "stateType": "authorized"},
    {"transactionId": "c", "cardId": "0123ABC", "date": "2024-01-10T00:00:00", "amount": -120, "currency": "EUR",
     "merchantName": "HOTEL REFUND", "stateType": "booked"}
  ]
}"#;

    #[test]
    fn test_booked_only_and_debit_positive() {
        let st = parse_and_normalize(&VisecaJson, &doc(SAMPLE)).unwrap();
        assert_eq!(st.account.as_deref(), Some("0123ABC"));
        assert_eq!(st.transactions.len(), 2);
        assert_eq!(st.transactions[0].description, "HOTEL REFUND");
        assert_eq!(st.transactions[0].amount.to_string(), "120");
        assert_eq!(st.transactions[0].currency.to_string(), "EUR");
        assert_eq!(st.transactions[1].description, "Coop");
        assert_eq!(st.transactions[1].amount.to_string(), "-42.5");
        assert_eq!(st.transactions[1].category.as_deref(), Some("Groceries"));
    }

    #[test]
    fn test_pages_are_read_in_order() {
        let page = |id: &str, day: u32| {
            format!(
                r#"{{"list": [{{"cardId": "0123ABC", "date": "2024-01-{day:02}T10:00:00", "amount": 10, "merchantName": "{id}", "stateType": "booked"}}]}}"#
            )
        };
        let mut d = doc(&page("first", 3));
        d.parts.push(DocumentPart::new("transactions-2", MediaType::Json, page("second", 2)));
        let st = parse_and_normalize(&VisecaJson, &d).unwrap();
        let merchants: Vec<_> = st.transactions.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(merchants, ["second", "first"]);
        assert_eq!(st.account.as_deref(), Some("0123ABC"));
    }

    #[test]
    fn test_large_amounts_stay_exact() {
        let body = r#"{"list": [
            {"date": "2024-01-05T00:00:00", "amount": 12345678901234567.89, "merchantName": "BIG", "stateType": "booked"},
            {"date": "2024-01-06T00:00:00", "amount": 0.000001, "merchantName": "TINY", "stateType": "booked"}
        ]}"#;
        let st = parse_and_normalize(&VisecaJson, &doc(body)).unwrap();
        assert_eq!(st.transactions[0].amount.to_string(), "-12345678901234567.89");
        assert_eq!(st.transactions[1].amount.to_string(), "-0.000001");
    }

    #[test]
    fn test_wrong_shape_is_unrecognized() {
        let err = VisecaJson.parse(&doc(r#"{"transactions": []}"#)).unwrap_err();
        assert!(matches!(err, FetchError::UnrecognizedFormat { .. }));
    }
}
