//! Coop digital receipts ("Ihr digitaler Kassenzettel"), one per document part.
//!
//! Each receipt is reduced to a single purchase: store name from the first
//! line, the `dd.mm.yy` sale date and the `Total CHF` amount.

use fetcher_core::{FetchError, RawDocument};
use regex::Regex;

use super::{part_text, StatementParser};
use crate::locale::{DateFormat, NumberFormat};
use crate::types::{Conventions, ParsedRow, ParsedStatement, SignConvention};

const FORMAT: &str = "coop-receipt-text";

pub const CONVENTIONS: Conventions = Conventions {
    sign: SignConvention::DebitPositive,
    date: DateFormat::Pattern("%d.%m.%y"),
    number: NumberFormat::SWISS,
    currency: Some("CHF"),
};

pub struct CoopReceiptText;

impl StatementParser for CoopReceiptText {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        let date_re =
            Regex::new(r"\b(?P<date>\d{2}\.\d{2}\.\d{2})\b").map_err(|e| FetchError::unrecognized(e.to_string(), ""))?;
        let total_re = Regex::new(r"(?m)^\s*Total\s+CHF\s+(?P<amount>-?[\d']+\.\d{2})\s*$")
            .map_err(|e| FetchError::unrecognized(e.to_string(), ""))?;

        let mut out = ParsedStatement::new(&doc.source, CONVENTIONS);
        out.account = doc.account.clone();
        out.period = doc.period;
        out.reference_date = Some(doc.reference_date());

        for (i, part) in doc.parts.iter().enumerate() {
            let text = part_text(part, FORMAT)?;
            let store = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
            let amount = total_re
                .captures(&text)
                .ok_or_else(|| FetchError::unrecognized(format!("{FORMAT}: no total in {}", part.name), &text))?;
            let date = date_re
                .captures(&text)
                .ok_or_else(|| FetchError::unrecognized(format!("{FORMAT}: no sale date in {}", part.name), &text))?;

            out.rows.push(ParsedRow::new(i + 1, &date["date"], &amount["amount"], store).category("groceries"));
        }
        Ok(out)
    }
}
