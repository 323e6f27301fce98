//! Interactive Brokers activity statement CSV.
//!
//! Every line is `Section,Kind,...` where kind is `Header`, `Data`, `SubTotal`
//! or `Total`. A section may repeat its header with different columns.

use std::collections::HashMap;

use chrono::NaiveDate;
use fetcher_core::{FetchError, Period, RawDocument};

use super::{csv_reader, field, first_text, Columns, StatementParser};
use crate::locale::{DateFormat, NumberFormat};
use crate::types::{BalanceUnit, Conventions, ParsedBalance, ParsedRow, ParsedStatement, SignConvention};

const FORMAT: &str = "interactive-brokers-csv";

pub const CONVENTIONS: Conventions = Conventions {
    sign: SignConvention::CreditPositive,
    date: DateFormat::Pattern("%Y-%m-%d"),
    number: NumberFormat::DOT_DECIMAL,
    currency: None,
};

/// Sections whose rows are cash flows.
const CASH_FLOW_SECTIONS: &[&str] = &["Deposits & Withdrawals", "Dividends", "Withholding Tax", "Fees", "Interest"];

pub struct InteractiveBrokersCsv;

fn statement_period(raw: &str) -> Option<Period> {
    let (start, end) = raw.split_once(" - ")?;
    let parse = |s: &str| NaiveDate::parse_from_str(s.trim(), "%B %d, %Y").ok();
    Period::new(parse(start)?, parse(end)?).ok()
}

impl StatementParser for InteractiveBrokersCsv {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        let text = first_text(doc, FORMAT)?;
        let mut out = ParsedStatement::new(&doc.source, CONVENTIONS);
        out.account = doc.account.clone();
        out.period = doc.period;

        // Data columns start after `Section,Kind`.
        let mut headers: HashMap<String, Columns> = HashMap::new();
        let mut saw_statement = false;

        for result in csv_reader(&text).records() {
            let record = result.map_err(|e| FetchError::unrecognized(format!("{FORMAT}: {e}"), &text))?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or_default();
            let section = field(&record, 0);
            let kind = field(&record, 1);
            let data: csv::StringRecord = record.iter().skip(2).collect();

            if kind == "Header" {
                headers.insert(section.to_string(), Columns::from_record(&data));
                continue;
            }
            if kind != "Data" {
                continue;
            }

            match section {
                "Statement" => {
                    saw_statement = true;
                    if field(&data, 0) == "Period" {
                        out.period = statement_period(field(&data, 1)).or(out.period);
                    }
                }
                "Account Information" => {
                    if field(&data, 0) == "Account" {
                        out.account = Some(field(&data, 1).to_string());
                    }
                }
                "Cash Report" => {
                    let Some(cols) = headers.get(section) else { continue };
                    let (Some(label), Some(ccy), Some(total)) = (
                        cols.find(&["Currency Summary"]),
                        cols.find(&["Currency"]),
                        cols.find(&["Total"]),
                    ) else {
                        continue;
                    };
                    let currency = field(&data, ccy);
                    if field(&data, label) == "Ending Cash" && currency != "Base Currency Summary" {
                        out.balances.push(ParsedBalance {
                            line,
                            account: "cash".to_string(),
                            as_of: None,
                            amount: field(&data, total).to_string(),
                            unit: BalanceUnit::Currency(currency.to_string()),
                        });
                    }
                }
                s if CASH_FLOW_SECTIONS.contains(&s) => {
                    let cols = headers
                        .get(section)
                        .ok_or_else(|| FetchError::unrecognized(format!("{FORMAT}: {section} data before header"), &text))?;
                    let ccy = cols.require(&["Currency"], FORMAT, &text)?;
                    let date = cols.require(&["Date", "Settle Date"], FORMAT, &text)?;
                    let desc = cols.require(&["Description"], FORMAT, &text)?;
                    let amount = cols.require(&["Amount"], FORMAT, &text)?;

                    let currency = field(&data, ccy);
                    // `Total`, `Total in CHF`, `Total Withholding Tax in CHF`, ...
                    if currency.starts_with("Total") || field(&data, date).is_empty() {
                        continue;
                    }
                    out.rows.push(
                        ParsedRow::new(line, field(&data, date), field(&data, amount), field(&data, desc))
                            .currency(currency)
                            .category(section),
                    );
                }
                _ => {}
            }
        }

        if !saw_statement {
            return Err(FetchError::unrecognized(format!("{FORMAT}: no Statement section"), &text));
        }
        out.reference_date = Some(out.period.map(|p| p.end).unwrap_or_else(|| doc.reference_date()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_and_normalize;
    use fetcher_core::MediaType;

    fn doc(text: &str) -> RawDocument {
        RawDocument::single("interactive-brokers", NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(), MediaType::Csv, text)
    }

    const SAMPLE: &str = "Statement,Header,Field Name,Field Value\n\
Statement,Data,Title,Activity Statement\n\
Statement,Data,Period,\"January 1, 2024 - January 31, 2024\"\n\
Account Information,Header,Field Name,Field Value\n\
Account Information,Data,Account,U1234567\n\
Cash Report,Header,Currency Summary,Currency,Total,Securities,Futures\n\
Cash Report,Data,Starting Cash,Base Currency Summary,10,10,0\n\
Cash Report,Data,Ending Cash,Base Currency Summary,1010.5,1010.5,0\n\
Cash Report,Data,Ending Cash,CHF,990.25,990.25,0\n\
Cash Report,Data,Ending Cash,USD,20.25,20.25,0\n\
Deposits & Withdrawals,Header,Currency,Settle Date,Description,Amount\n\
Deposits & Withdrawals,Data,CHF,2024-01-05,Electronic Fund Transfer,1000\n\
Deposits & Withdrawals,Data,Total,,,1000\n\
Dividends,Header,Currency,Date,Description,Amount\n\
Dividends,Data,USD,2024-01-20,VT(US9220427424) Cash Dividend USD 0.25 per Share (Ordinary Dividend),25.00\n\
Dividends,Data,Total,,,25.00\n\
Withholding Tax,Header,Currency,Date,Description,Amount,Code\n\
Withholding Tax,Data,USD,2024-01-20,VT(US9220427424) Cash Dividend USD 0.25 per Share - US Tax,-3.75,\n\
Withholding Tax,Data,Total Withholding Tax in CHF,,,-3.21,\n\
Fees,Header,Subtitle,Currency,Date,Description,Amount\n\
Fees,Data,Other Fees,CHF,2024-01-03,Market data fee,-9.75\n\
Fees,Data,Total,,,,-9.75\n";

    #[test]
    fn test_cash_flow_sections() {
        let st = parse_and_normalize(&InteractiveBrokersCsv, &doc(SAMPLE)).unwrap();
        assert_eq!(st.account.as_deref(), Some("U1234567"));
        assert_eq!(st.period_start, NaiveDate::from_ymd_opt(2024, 1, 1));
        let summary: Vec<(String, String, Option<String>)> = st
            .transactions
            .iter()
            .map(|t| (t.amount.to_string(), t.currency.to_string(), t.category.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("-9.75".to_string(), "CHF".to_string(), Some("Fees".to_string())),
                ("1000".to_string(), "CHF".to_string(), Some("Deposits & Withdrawals".to_string())),
                ("25.00".to_string(), "USD".to_string(), Some("Dividends".to_string())),
                ("-3.75".to_string(), "USD".to_string(), Some("Withholding Tax".to_string())),
            ]
        );
    }

    #[test]
    fn test_ending_cash_balances() {
        let st = parse_and_normalize(&InteractiveBrokersCsv, &doc(SAMPLE)).unwrap();
        assert_eq!(st.balances.len(), 2);
        assert_eq!(st.balances[0].currency.to_string(), "CHF");
        assert_eq!(st.balances[0].amount.to_string(), "990.25");
        assert_eq!(st.balances[0].as_of, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn test_not_a_statement() {
        let err = InteractiveBrokersCsv.parse(&doc("Date,Amount\n2024-01-01,3\n")).unwrap_err();
        assert!(matches!(err, FetchError::UnrecognizedFormat { .. }));
    }
}
