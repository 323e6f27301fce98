//! AMEX CSV statement exports.
//!
//! AMEX CSVs have a few blank rows, then:
//! Date,Description,Amount,Extended Details,Appears On Your Statement As,
//! Address,City/State,Zip Code,Country,Reference,Category
//!
//! Amounts are positive for charges.

use fetcher_core::{FetchError, RawDocument};

use super::{csv_reader, field, first_text, Columns, StatementParser};
use crate::locale::{DateFormat, NumberFormat};
use crate::types::{Conventions, ParsedRow, ParsedStatement, SignConvention};

const FORMAT: &str = "amex-csv";

pub const CONVENTIONS: Conventions = Conventions {
    sign: SignConvention::DebitPositive,
    date: DateFormat::Pattern("%m/%d/%Y"),
    number: NumberFormat::DOT_DECIMAL,
    currency: Some("USD"),
};

struct Layout {
    date: usize,
    description: usize,
    amount: usize,
    category: Option<usize>,
}

pub struct AmexCsv;

impl StatementParser for AmexCsv {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        let text = first_text(doc, FORMAT)?;
        let mut out = ParsedStatement::new(&doc.source, CONVENTIONS);
        out.account = doc.account.clone();
        out.period = doc.period;
        out.reference_date = Some(doc.reference_date());

        let mut layout: Option<Layout> = None;
        for result in csv_reader(&text).records() {
            let record = result.map_err(|e| FetchError::unrecognized(format!("{FORMAT}: {e}"), &text))?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or_default();

            // Skip until we find the header row
            if layout.is_none() {
                if field(&record, 0) == "Date" {
                    let cols = Columns::from_record(&record);
                    layout = Some(Layout {
                        date: cols.require(&["Date"], FORMAT, &text)?,
                        description: cols.require(&["Description"], FORMAT, &text)?,
                        amount: cols.require(&["Amount"], FORMAT, &text)?,
                        category: cols.find(&["Category"]),
                    });
                }
                continue;
            }
            let Some(l) = &layout else { continue };

            let date = field(&record, l.date);
            if date.is_empty() {
                continue;
            }
            let mut row = ParsedRow::new(line, date, field(&record, l.amount), field(&record, l.description));
            if let Some(c) = l.category {
                row = row.category(field(&record, c));
            }
            out.rows.push(row);
        }

        if layout.is_none() {
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
        RawDocument::single("amex", NaiveDate::from_ymd_opt(2026, 2, 20).unwrap(), MediaType::Csv, text)
    }

    const SAMPLE: &str = "\n\n\n\n\n\nDate,Description,Amount,Extended Details,Appears On Your Statement As,Address,City/State,Zip Code,Country,Reference,Category\n\
02/16/2026,CLIPPER SERVICE,10.00,,CLIPPER,\"1 MAIN ST\",SAN FRANCISCO CA,94105,UNITED STATES,'320260470',Other-Government Services\n\
02/14/2026,AUTOPAY PAYMENT - THANK YOU,-250.00,,,,,,,'320260450',\n\
02/10/2026,ELEVENLABS.IO,5.33,,,,,,,'320260410',Merchandise & Supplies-Computer Supplies\n";

    #[test]
    fn test_parse_amex_rows() {
        let parsed = AmexCsv.parse(&doc(SAMPLE)).unwrap();
        assert_eq!(parsed.rows.len(), 3);
        assert_eq!(parsed.rows[0].date, "02/16/2026");
        assert_eq!(parsed.rows[0].category.as_deref(), Some("Other-Government Services"));
        assert_eq!(parsed.rows[1].category, None);
    }

    #[test]
    fn test_amex_charges_become_debits() {
        let st = parse_and_normalize(&AmexCsv, &doc(SAMPLE)).unwrap();
        let clipper = st.transactions.iter().find(|t| t.description.contains("CLIPPER")).unwrap();
        assert_eq!(clipper.amount.to_string(), "-10.00");
        let payment = st.transactions.iter().find(|t| t.description.contains("AUTOPAY")).unwrap();
        assert_eq!(payment.amount.to_string(), "250.00");
        assert_eq!(clipper.currency.to_string(), "USD");
        // chronological
        assert!(st.transactions.windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[test]
    fn test_missing_header_is_unrecognized() {
        let err = AmexCsv.parse(&doc("Datum,Betrag\n01.01.2026,3.00\n")).unwrap_err();
        assert!(matches!(err, FetchError::UnrecognizedFormat { .. }));
    }
}
