//! Charles Schwab transaction history CSV (brokerage and Equity Award Center).
//!
//! Older exports start with a title line naming the account. Dates may read
//! `01/16/2024 as of 01/15/2024`; the first date is the booking date. Award
//! exports interleave undated detail rows under each sale or deposit.

use fetcher_core::{FetchError, RawDocument};
use regex::Regex;

use super::{csv_reader, field, first_text, Columns, StatementParser};
use crate::locale::{DateFormat, NumberFormat};
use crate::types::{Conventions, ParsedRow, ParsedStatement, SignConvention};

const FORMAT: &str = "schwab-csv";

pub const CONVENTIONS: Conventions = Conventions {
    sign: SignConvention::CreditPositive,
    date: DateFormat::Pattern("%m/%d/%Y"),
    number: NumberFormat::DOT_DECIMAL,
    currency: Some("USD"),
};

pub struct SchwabCsv;

impl StatementParser for SchwabCsv {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        let text = first_text(doc, FORMAT)?;
        // The title names the account type before its masked number (`Individual ...123`).
        let account_re = Regex::new(r"(?i)\baccount\b.*?(?P<acct>\.{3}\d+|X{2,}-?\d{3,}|\d{4}-\d{4})")
            .map_err(|e| FetchError::unrecognized(e.to_string(), ""))?;

        let mut out = ParsedStatement::new(&doc.source, CONVENTIONS);
        out.account = doc.account.clone();
        out.period = doc.period;
        out.reference_date = Some(doc.reference_date());

        let mut columns: Option<(usize, usize, usize, usize, Option<usize>)> = None;
        for result in csv_reader(&text).records() {
            let record = result.map_err(|e| FetchError::unrecognized(format!("{FORMAT}: {e}"), &text))?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or_default();

            let Some((date_col, action_col, desc_col, amount_col, symbol_col)) = columns else {
                let first = field(&record, 0);
                if first == "Date" {
                    let cols = Columns::from_record(&record);
                    columns = Some((
                        cols.require(&["Date"], FORMAT, &text)?,
                        cols.require(&["Action"], FORMAT, &text)?,
                        cols.require(&["Description"], FORMAT, &text)?,
                        cols.require(&["Amount"], FORMAT, &text)?,
                        cols.find(&["Symbol"]),
                    ));
                } else if let Some(caps) = account_re.captures(first) {
                    out.account = Some(caps["acct"].to_string());
                }
                continue;
            };

            let raw_date = field(&record, date_col);
            // Award detail rows and the trailing `Transactions Total` line
            if raw_date.is_empty() || raw_date.starts_with("Transactions Total") {
                continue;
            }
            let amount = field(&record, amount_col);
            // Share deposits move no cash.
            if amount.is_empty() {
                continue;
            }
            let date = raw_date.split(" as of ").next().unwrap_or(raw_date);
            let action = field(&record, action_col);
            let symbol = symbol_col.map(|c| field(&record, c)).unwrap_or("");
            let description = match (symbol, field(&record, desc_col)) {
                ("", "") => action.to_string(),
                ("", d) => d.to_string(),
                (s, "") => format!("{action} {s}"),
                (s, d) => format!("{s} {d}"),
            };
            out.rows.push(ParsedRow::new(line, date, amount, description).category(action));
        }

        if columns.is_none() {
            return Err(FetchError::unrecognized(format!("{FORMAT}: header row not found"), &text));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_and_normalize;
    use chrono::NaiveDate;
    use fetcher_core::MediaType;

    fn doc(text: &str) -> RawDocument {
        RawDocument::single("schwab-brokerage", NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), MediaType::Csv, text)
    }

    #[test]
    fn test_brokerage_export() {
        let text = "\"Transactions  for account Individual ...123 as of 02/01/2024 08:00 AM ET\"\n\
\"Date\",\"Action\",\"Symbol\",\"Description\",\"Quantity\",\"Price\",\"Fees & Comm\",\"Amount\"\n\
\"01/16/2024 as of 01/15/2024\",\"Qualified Dividend\",\"VT\",\"VANGUARD TOTAL WORLD ETF\",\"\",\"\",\"\",\"$25.00\"\n\
\"01/10/2024\",\"MoneyLink Transfer\",\"\",\"Tfr BANK\",\"\",\"\",\"\",\"-$1,000.00\"\n\
\"Transactions Total\",\"\",\"\",\"\",\"\",\"\",\"\",\"-$975.00\"\n";

        let st = parse_and_normalize(&SchwabCsv, &doc(text)).unwrap();
        assert_eq!(st.account.as_deref(), Some("...123"));
        assert_eq!(st.transactions.len(), 2);
        assert_eq!(st.transactions[0].amount.to_string(), "-1000.00");
        assert_eq!(st.transactions[0].description, "Tfr BANK");
        assert_eq!(st.transactions[1].date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
        assert_eq!(st.transactions[1].description, "VT VANGUARD TOTAL WORLD ETF");
        assert_eq!(st.transactions[1].category.as_deref(), Some("Qualified Dividend"));
    }

    #[test]
    fn test_account_number_after_account_type() {
        let header = "\"Date\",\"Action\",\"Symbol\",\"Description\",\"Quantity\",\"Price\",\"Fees & Comm\",\"Amount\"\n";
        for (title, account) in [
            ("Transactions for account Joint Tenant ...9876 as of 02/01/2024", "...9876"),
            ("Transactions for account XXXX-4321 as of 02/01/2024", "XXXX-4321"),
        ] {
            let st = parse_and_normalize(&SchwabCsv, &doc(&format!("\"{title}\"\n{header}"))).unwrap();
            assert_eq!(st.account.as_deref(), Some(account), "{title}");
        }
    }

    #[test]
    fn test_award_detail_rows_skipped() {
        let text = "\"Date\",\"Action\",\"Symbol\",\"Description\",\"Quantity\",\"FeesAndCommissions\",\"DisbursementElection\",\"Amount\"\n\
\"01/25/2024\",\"Deposit\",\"GOOG\",\"RS\",\"10\",\"\",\"\",\"\"\n\
\"\",\"\",\"\",\"\",\"AwardDate\",\"AwardId\",\"VestDate\",\"\"\n\
\"\",\"\",\"\",\"\",\"01/01/2022\",\"12345\",\"01/25/2024\",\"\"\n\
\"01/26/2024\",\"Sale\",\"GOOG\",\"Share Sale\",\"10\",\"$0.10\",\"\",\"$1,400.00\"\n\
\"02/01/2024\",\"Journal\",\"\",\"\",\"\",\"\",\"\",\"-$1,399.90\"\n";
        let st = parse_and_normalize(&SchwabCsv, &doc(text)).unwrap();
        let amounts: Vec<String> = st.transactions.iter().map(|t| t.amount.to_string()).collect();
        assert_eq!(amounts, vec!["1400.00", "-1399.90"]);
        assert_eq!(st.transactions[1].description, "Journal");
    }

    #[test]
    fn test_missing_header() {
        let err = SchwabCsv.parse(&doc("\"Posted\",\"Value\"\n")).unwrap_err();
        assert!(matches!(err, FetchError::UnrecognizedFormat { .. }));
    }
}
