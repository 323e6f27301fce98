//! Capital One US statement parser (PDF text)
//!
//! Expected text rows after PDF-to-text:
//!   Jul 15, 2024 - Aug 14, 2024 | 31 days in Billing Cycle
//!   Trans Date     Post Date      Description                                         Amount
//!   Jul 20         Jul 22         H-E-B #455SAN MARCOSTX                                $5.82
//!   Jul 28         Jul 29         WALMART.COMWALMART.COMAR                            - $14.05
//!
//! Rows carry no year; it is taken from the billing cycle. Positive amounts
//! are charges, `- $` marks payments and credits.

use chrono::NaiveDate;
use fetcher_core::{FetchError, Period, RawDocument};
use regex::Regex;

use super::{first_text, StatementParser};
use crate::locale::{DateFormat, NumberFormat};
use crate::types::{Conventions, ParsedRow, ParsedStatement, SignConvention};

const FORMAT: &str = "capital-one-us-text";

pub const CONVENTIONS: Conventions = Conventions {
    sign: SignConvention::DebitPositive,
    date: DateFormat::MonthDay("%b %d"),
    number: NumberFormat::DOT_DECIMAL,
    currency: Some("USD"),
};

pub struct CapitalOneUsText;

fn billing_cycle(text: &str) -> Option<Period> {
    let re = Regex::new(
        r"(?P<start>[A-Z][a-z]{2}\.?\s+\d{1,2},\s+\d{4})\s+-\s+(?P<end>[A-Z][a-z]{2}\.?\s+\d{1,2},\s+\d{4})",
    )
    .ok()?;
    let caps = re.captures(text)?;
    let parse = |s: &str| NaiveDate::parse_from_str(&s.replace('.', ""), "%b %d, %Y").ok();
    Period::new(parse(&caps["start"])?, parse(&caps["end"])?).ok()
}

impl StatementParser for CapitalOneUsText {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        let text = first_text(doc, FORMAT)?;

        let header_re = Regex::new(r"Trans\s+Date\s+Post\s+Date\s+Description\s+Amount")
            .map_err(|e| FetchError::unrecognized(e.to_string(), ""))?;
        let txn_re = Regex::new(concat!(
            r"^\s*(?P<trans>[A-Za-z]{3}\s+\d{1,2})\s+",
            r"(?P<post>[A-Za-z]{3}\s+\d{1,2})\s+",
            r"(?P<desc>.+?)\s+",
            r"(?P<polarity>-)?\s*\$(?P<amt>\d{1,3}(?:,\d{3})*\.\d{2})\s*$"
        ))
        .map_err(|e| FetchError::unrecognized(e.to_string(), ""))?;
        let account_re = Regex::new(r"ending in (?P<acct>\d{4})")
            .map_err(|e| FetchError::unrecognized(e.to_string(), ""))?;

        let mut out = ParsedStatement::new(&doc.source, CONVENTIONS);
        let cycle = billing_cycle(&text);
        out.period = cycle.or(doc.period);
        out.reference_date = Some(cycle.map(|p| p.end).unwrap_or_else(|| doc.reference_date()));
        out.account = account_re
            .captures(&text)
            .map(|c| format!("capital-one-{}", &c["acct"]))
            .or_else(|| doc.account.clone());

        let mut in_section = false;
        for (i, line) in text.lines().enumerate() {
            if !in_section {
                if header_re.is_match(line) {
                    in_section = true;
                }
                continue;
            }

            if let Some(caps) = txn_re.captures(line) {
                let polarity = if caps.name("polarity").is_some() { "-" } else { "" };
                out.rows.push(ParsedRow::new(
                    i + 1,
                    caps["trans"].trim(),
                    format!("{polarity}{}", &caps["amt"]),
                    caps["desc"].trim(),
                ));
            }
        }

        if !in_section {
            return Err(FetchError::unrecognized(
                format!("{FORMAT}: transaction header not found"),
                &text,
            ));
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
        RawDocument::single("capital-one", NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(), MediaType::Text, text)
    }

    #[test]
    fn test_parses_basic_rows() {
        let text = r#"
Platinum Card | Visa ending in 1234
Jul 15, 2024 - Aug 14, 2024 | 31 days in Billing Cycle
Trans Date     Post Date      Description                                         Amount
Jul 20         Jul 22         H-E-B #455SAN MARCOSTX                                $5.82
Jul 28         Jul 29         WALMART.COMWALMART.COMAR                            - $14.05
"#;

        let parsed = CapitalOneUsText.parse(&doc(text)).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.account.as_deref(), Some("capital-one-1234"));
        assert_eq!(parsed.reference_date, NaiveDate::from_ymd_opt(2024, 8, 14));

        let st = parse_and_normalize(&CapitalOneUsText, &doc(text)).unwrap();
        assert_eq!(st.transactions[0].amount.to_string(), "-5.82");
        assert_eq!(st.transactions[1].amount.to_string(), "14.05");
        assert!(st.transactions[0].description.contains("H-E-B"));
        assert_eq!(st.transactions[0].date, NaiveDate::from_ymd_opt(2024, 7, 20).unwrap());
        assert_eq!(st.period_start, NaiveDate::from_ymd_opt(2024, 7, 15));
    }

    #[test]
    fn test_year_boundary_cycle() {
        let text = r#"
Dec 15, 2023 - Jan 14, 2024 | 31 days in Billing Cycle
Trans Date     Post Date      Description                                         Amount
Dec 28         Dec 29         AMAZON MKTPL                                        $1,020.00
Jan 02         Jan 03         SPOTIFY                                             $11.99
"#;
        let st = parse_and_normalize(&CapitalOneUsText, &doc(text)).unwrap();
        assert_eq!(st.transactions[0].date, NaiveDate::from_ymd_opt(2023, 12, 28).unwrap());
        assert_eq!(st.transactions[0].amount.to_string(), "-1020.00");
        assert_eq!(st.transactions[1].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_layout_change_is_unrecognized() {
        let err = CapitalOneUsText.parse(&doc("Date | Merchant | Amount\n")).unwrap_err();
        assert!(matches!(err, FetchError::UnrecognizedFormat { .. }));
    }
}
