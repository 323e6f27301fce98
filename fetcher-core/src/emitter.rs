//! Serialize canonical records for the ledger-import consumer.
//!
//! JSON Lines (default), one object per line, field order fixed:
//!
//! ```text
//! {"record":"statement","source":..,"account":..,"period_start":..,"period_end":..,"transactions":N,"balances":M}
//! {"record":"transaction","source":..,"ordinal":0,"date":"2024-01-01","amount":"1200.00","currency":"CHF","description":"Salary","category":null}
//! {"record":"balance","source":..,"account":..,"as_of":"2024-01-31","amount":"1150.00","currency":"CHF"}
//! ```
//!
//! CSV: `record,source,account,date,amount,currency,description,category`, one
//! row per transaction then one per balance (statement header rows are not
//! emitted). Amounts keep the scale the source used. Output is a pure
//! function of the Statement, so identical input yields identical bytes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use std::str::FromStr;
use thiserror::Error;

use crate::model::{Currency, Statement};

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    JsonLines,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::JsonLines => "jsonl",
            OutputFormat::Csv => "csv",
        }
    }

    pub fn emitter<'a, W: Write + 'a>(&self, out: W) -> Box<dyn Emitter + 'a> {
        match self {
            OutputFormat::JsonLines => Box::new(JsonLinesEmitter::new(out)),
            OutputFormat::Csv => Box::new(CsvEmitter::new(out)),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "json-lines" | "ndjson" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unknown output format: {other} (expected jsonl or csv)")),
        }
    }
}

pub trait Emitter {
    fn emit(&mut self, statement: &Statement) -> Result<(), EmitError>;

    /// Flush buffered output.
    fn finish(&mut self) -> Result<(), EmitError>;
}

/// Emit one statement into a fresh buffer.
pub fn emit_to_vec(format: OutputFormat, statement: &Statement) -> Result<Vec<u8>, EmitError> {
    let mut buf = Vec::new();
    {
        let mut emitter = format.emitter(&mut buf);
        emitter.emit(statement)?;
        emitter.finish()?;
    }
    Ok(buf)
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record<'a> {
    Statement {
        source: &'a str,
        account: Option<&'a str>,
        period_start: Option<NaiveDate>,
        period_end: Option<NaiveDate>,
        transactions: usize,
        balances: usize,
    },
    Transaction {
        source: &'a str,
        ordinal: usize,
        date: NaiveDate,
        amount: &'a Decimal,
        currency: &'a Currency,
        description: &'a str,
        category: Option<&'a str>,
    },
    Balance {
        source: &'a str,
        account: &'a str,
        as_of: NaiveDate,
        amount: &'a Decimal,
        currency: &'a Currency,
    },
}

fn records(st: &Statement) -> impl Iterator<Item = Record<'_>> {
    let header = Record::Statement {
        source: &st.source,
        account: st.account.as_deref(),
        period_start: st.period_start,
        period_end: st.period_end,
        transactions: st.transactions.len(),
        balances: st.balances.len(),
    };
    let txns = st.transactions.iter().map(move |t| Record::Transaction {
        source: &st.source,
        ordinal: t.ordinal,
        date: t.date,
        amount: &t.amount,
        currency: &t.currency,
        description: &t.description,
        category: t.category.as_deref(),
    });
    let balances = st.balances.iter().map(move |b| Record::Balance {
        source: &st.source,
        account: &b.account,
        as_of: b.as_of,
        amount: &b.amount,
        currency: &b.currency,
    });
    std::iter::once(header).chain(txns).chain(balances)
}

pub struct JsonLinesEmitter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Emitter for JsonLinesEmitter<W> {
    fn emit(&mut self, statement: &Statement) -> Result<(), EmitError> {
        for record in records(statement) {
            serde_json::to_writer(&mut self.out, &record)?;
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EmitError> {
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    record: &'static str,
    source: &'a str,
    account: Option<&'a str>,
    date: NaiveDate,
    amount: &'a Decimal,
    currency: String,
    description: Option<&'a str>,
    category: Option<&'a str>,
}

pub struct CsvEmitter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvEmitter<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().has_headers(true).from_writer(out),
        }
    }
}

impl<W: Write> Emitter for CsvEmitter<W> {
    fn emit(&mut self, st: &Statement) -> Result<(), EmitError> {
        for t in &st.transactions {
            self.writer.serialize(CsvRow {
                record: "transaction",
                source: &st.source,
                account: st.account.as_deref(),
                date: t.date,
                amount: &t.amount,
                currency: t.currency.to_string(),
                description: Some(&t.description),
                category: t.category.as_deref(),
            })?;
        }
        for b in &st.balances {
            self.writer.serialize(CsvRow {
                record: "balance",
                source: &st.source,
                account: Some(&b.account),
                date: b.as_of,
                amount: &b.amount,
                currency: b.currency.to_string(),
                description: None,
                category: None,
            })?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EmitError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Balance, Transaction};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample() -> Statement {
        let chf = Currency::parse("CHF").unwrap();
        Statement {
            source: "mock".to_string(),
            account: Some("CH00".to_string()),
            period_start: Some(d(2024, 1, 1)),
            period_end: Some(d(2024, 1, 31)),
            transactions: vec![
                Transaction {
                    ordinal: 0,
                    date: d(2024, 1, 1),
                    amount: "1200.00".parse().unwrap(),
                    currency: chf.clone(),
                    description: "Salary".to_string(),
                    category: None,
                },
                Transaction {
                    ordinal: 1,
                    date: d(2024, 1, 5),
                    amount: "-50.00".parse().unwrap(),
                    currency: chf.clone(),
                    description: "Groceries, \"Coop\"".to_string(),
                    category: Some("food".to_string()),
                },
            ],
            balances: vec![Balance {
                account: "CH00".to_string(),
                as_of: d(2024, 1, 31),
                amount: "1150.00".parse().unwrap(),
                currency: chf,
            }],
        }
    }

    #[test]
    fn test_jsonl_layout() {
        let out = String::from_utf8(emit_to_vec(OutputFormat::JsonLines, &sample()).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            r#"{"record":"statement","source":"mock","account":"CH00","period_start":"2024-01-01","period_end":"2024-01-31","transactions":2,"balances":1}"#
        );
        assert_eq!(
            lines[1],
            r#"{"record":"transaction","source":"mock","ordinal":0,"date":"2024-01-01","amount":"1200.00","currency":"CHF","description":"Salary","category":null}"#
        );
        assert!(lines[2].contains(r#""amount":"-50.00""#));
        assert!(lines[3].starts_with(r#"{"record":"balance""#));
    }

    #[test]
    fn test_csv_layout() {
        let out = String::from_utf8(emit_to_vec(OutputFormat::Csv, &sample()).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "record,source,account,date,amount,currency,description,category");
        assert_eq!(lines[1], "transaction,mock,CH00,2024-01-01,1200.00,CHF,Salary,");
        assert_eq!(
            lines[2],
            r#"transaction,mock,CH00,2024-01-05,-50.00,CHF,"Groceries, ""Coop""",food"#
        );
        assert_eq!(lines[3], "balance,mock,CH00,2024-01-31,1150.00,CHF,,");
    }

    #[test]
    fn test_emit_is_deterministic() {
        let st = sample();
        for format in [OutputFormat::JsonLines, OutputFormat::Csv] {
            assert_eq!(emit_to_vec(format, &st).unwrap(), emit_to_vec(format, &st).unwrap());
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("ndjson".parse::<OutputFormat>().unwrap(), OutputFormat::JsonLines);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
