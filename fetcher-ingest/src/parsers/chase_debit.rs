//! Chase checking statement parser (PDF text)
//!
//! Expected extracted-text section:
//!   TRANSACTION DETAIL
//!          DATE        DESCRIPTION                                     AMOUNT     BALANCE
//!                      Beginning Balance                                          $68.70
//!          04/22       Discover     E-Payment 8148   Web ID: ...       -15.00      53.70
//!                      Ending Balance                                             $53.70
//!
//! The section may continue across pages; long descriptions wrap onto
//! indented lines without a date.

use chrono::NaiveDate;
use fetcher_core::{FetchError, Period, RawDocument};
use regex::Regex;

use super::{first_text, StatementParser};
use crate::locale::{DateFormat, NumberFormat};
use crate::types::{BalanceUnit, Conventions, ParsedBalance, ParsedRow, ParsedStatement, SignConvention};

const FORMAT: &str = "chase-debit-text";

pub const CONVENTIONS: Conventions = Conventions {
    sign: SignConvention::CreditPositive,
    date: DateFormat::MonthDay("%m/%d"),
    number: NumberFormat::DOT_DECIMAL,
    currency: Some("USD"),
};

pub struct ChaseDebitText;

fn statement_period(text: &str) -> Option<Period> {
    let re = Regex::new(r"(?P<start>[A-Z][a-z]+ \d{1,2}, \d{4})\s*through\s*(?P<end>[A-Z][a-z]+ \d{1,2}, \d{4})").ok()?;
    let caps = re.captures(text)?;
    let parse = |s: &str| NaiveDate::parse_from_str(s, "%B %d, %Y").ok();
    Period::new(parse(&caps["start"])?, parse(&caps["end"])?).ok()
}

fn is_noise(line: &str) -> bool {
    let t = line.trim();
    t.is_empty()
        || t.starts_with("Page ")
        || t.starts_with("DATE")
        || t.starts_with("Beginning Balance")
        || t.contains("TRANSACTION DETAIL")
        || t.contains("(continued)")
}

impl StatementParser for ChaseDebitText {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        let text = first_text(doc, FORMAT)?;

        let header_re = Regex::new(r"TRANSACTION\s+DETAIL").map_err(|e| FetchError::unrecognized(e.to_string(), ""))?;
        // DATE DESCRIPTION AMOUNT BALANCE
        let txn_re = Regex::new(concat!(
            r"^\s*(?P<date>\d{2}/\d{2})\s+",
            r"(?P<desc>.+?)\s+",
            r"(?P<amount>-?[\d,]+\.\d{2})\s+",
            r"(?P<balance>-?[\d,]+\.\d{2})\s*$"
        ))
        .map_err(|e| FetchError::unrecognized(e.to_string(), ""))?;
        let account_re =
            Regex::new(r"Account Number:\s*\d*(?P<last>\d{4})\b").map_err(|e| FetchError::unrecognized(e.to_string(), ""))?;

        let mut out = ParsedStatement::new(&doc.source, CONVENTIONS);
        let period = statement_period(&text);
        out.period = period.or(doc.period);
        out.reference_date = Some(period.map(|p| p.end).unwrap_or_else(|| doc.reference_date()));
        out.account = account_re
            .captures(&text)
            .map(|c| format!("chase-{}", &c["last"]))
            .or_else(|| doc.account.clone());

        let mut seen_header = false;
        let mut in_section = false;
        let mut last_balance: Option<(usize, String)> = None;
        // Only lines directly under a transaction may continue its description
        let mut can_wrap = false;

        for (i, line) in text.lines().enumerate() {
            if header_re.is_match(line) {
                seen_header = true;
                in_section = true;
                can_wrap = false;
                continue;
            }
            if !in_section {
                continue;
            }
            if line.trim_start().starts_with("Ending Balance") {
                in_section = false;
                continue;
            }

            if let Some(caps) = txn_re.captures(line) {
                out.rows.push(ParsedRow::new(
                    i + 1,
                    &caps["date"],
                    &caps["amount"],
                    caps["desc"].trim(),
                ));
                last_balance = Some((i + 1, caps["balance"].to_string()));
                can_wrap = true;
                continue;
            }

            if is_noise(line) {
                can_wrap = false;
                continue;
            }
            if can_wrap && line.starts_with(char::is_whitespace) {
                if let Some(row) = out.rows.last_mut() {
                    row.description.push(' ');
                    row.description.push_str(line.trim());
                }
            }
        }

        if !seen_header {
            return Err(FetchError::unrecognized(
                format!("{FORMAT}: TRANSACTION DETAIL section not found"),
                &text,
            ));
        }

        if let Some((line, amount)) = last_balance {
            out.balances.push(ParsedBalance {
                line,
                account: out.account.clone().unwrap_or_else(|| "checking".to_string()),
                as_of: None,
                amount,
                unit: BalanceUnit::Currency("USD".to_string()),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_and_normalize;
    use fetcher_core::MediaType;

    fn doc(text: &str) -> RawDocument {
        RawDocument::single("chase-debit", NaiveDate::from_ymd_opt(2026, 5, 15).unwrap(), MediaType::Text, text)
    }

    const SAMPLE: &str = r#"
April 10, 2026 through May 9, 2026
Primary Account Number: 000000987654321
TRANSACTION DETAIL
       DATE        DESCRIPTION                                     AMOUNT     BALANCE
                   Beginning Balance                                          $68.70
       04/22       Discover     E-Payment 8148   Web ID: 123       -15.00      53.70
       04/23       PAYROLL ACME INC                                100.00     153.70
                   PPD ID: 9101
                                                             Page 1 of 2
TRANSACTION DETAIL (continued)
       DATE        DESCRIPTION                                     AMOUNT     BALANCE
       05/02       Zelle Payment To Landlord                     -1,000.00    -846.30
                   Ending Balance                                           -$846.30
"#;

    #[test]
    fn test_parse_chase_debit_basic() {
        let parsed = ChaseDebitText.parse(&doc(SAMPLE)).unwrap();
        assert_eq!(parsed.rows.len(), 3);
        assert_eq!(parsed.rows[1].description, "PAYROLL ACME INC PPD ID: 9101");
        assert_eq!(parsed.account.as_deref(), Some("chase-4321"));
        assert_eq!(parsed.balances.len(), 1);
        assert_eq!(parsed.balances[0].amount, "-846.30");
    }

    #[test]
    fn test_chase_amounts_keep_sign() {
        let st = parse_and_normalize(&ChaseDebitText, &doc(SAMPLE)).unwrap();
        let amounts: Vec<String> = st.transactions.iter().map(|t| t.amount.to_string()).collect();
        assert_eq!(amounts, vec!["-15.00", "100.00", "-1000.00"]);
        assert_eq!(st.transactions[0].date, NaiveDate::from_ymd_opt(2026, 4, 22).unwrap());
        assert_eq!(st.balances[0].as_of, NaiveDate::from_ymd_opt(2026, 5, 9).unwrap());
        assert_eq!(st.period_end, NaiveDate::from_ymd_opt(2026, 5, 9));
    }

    #[test]
    fn test_missing_section_is_unrecognized() {
        let err = ChaseDebitText.parse(&doc("CHECKING SUMMARY\nnothing here\n")).unwrap_err();
        assert!(matches!(err, FetchError::UnrecognizedFormat { .. }));
    }
}
