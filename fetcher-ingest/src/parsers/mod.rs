//! Institution-specific parsers.
//!
//! Every parser is a pure function of a [`RawDocument`]: no I/O, no session.
//! A parser fails with `UnrecognizedFormat` when the document does not look
//! like the template it knows; it never interprets dates or amounts itself.

pub mod amex;
pub mod capital_one_us;
pub mod chase_debit;
pub mod coop_receipt;
pub mod degiro;
pub mod interactive_brokers;
pub mod schwab;
pub mod splitwise;
pub mod viseca;

use std::collections::HashMap;

use fetcher_core::{DocumentPart, FetchError, MediaType, RawDocument, Statement};

use crate::normalize::normalize;
use crate::types::ParsedStatement;

pub trait StatementParser: Send + Sync {
    /// Short name of the document template, for logs.
    fn format(&self) -> &'static str;

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError>;
}

/// Parse then normalize; what an adapter does after retrieval.
pub fn parse_and_normalize(parser: &dyn StatementParser, doc: &RawDocument) -> Result<Statement, FetchError> {
    normalize(parser.parse(doc)?)
}

/// Text of the first part, refusing binary formats that were never extracted.
pub(crate) fn first_text(doc: &RawDocument, format: &str) -> Result<String, FetchError> {
    let part = doc
        .parts
        .first()
        .ok_or_else(|| FetchError::unrecognized(format!("{format}: document has no parts"), ""))?;
    part_text(part, format)
}

pub(crate) fn part_text(part: &DocumentPart, format: &str) -> Result<String, FetchError> {
    if part.media == MediaType::Pdf {
        return Err(FetchError::unrecognized(
            format!("{format}: {} is a PDF that was not converted to text", part.name),
            "",
        ));
    }
    Ok(part.text())
}

/// Header-name lookup for CSV exports whose column order drifts.
pub(crate) struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    pub fn from_record(record: &csv::StringRecord) -> Self {
        let index = record
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.trim().is_empty())
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();
        Self { index }
    }

    /// First column matching any of `names` (case-insensitive).
    pub fn find(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|n| self.index.get(&n.to_lowercase()).copied())
    }

    pub fn require(&self, names: &[&str], format: &str, context: &str) -> Result<usize, FetchError> {
        self.find(names).ok_or_else(|| {
            FetchError::unrecognized(format!("{format}: missing column {:?}", names[0]), context)
        })
    }
}

/// Trimmed field, empty when the record is short.
pub(crate) fn field(record: &csv::StringRecord, idx: usize) -> &str {
    record.get(idx).map(str::trim).unwrap_or("")
}

pub(crate) fn csv_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(text.as_bytes())
}
