//! Raw documents as handed from retrieval to parsing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::period::Period;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Csv,
    Json,
    Text,
    Html,
    Pdf,
}

impl MediaType {
    /// Guess from a file name or `Content-Type`/MIME string.
    pub fn guess(hint: &str) -> Option<Self> {
        let h = hint.to_ascii_lowercase();
        if h.ends_with(".csv") || h.contains("text/csv") {
            Some(MediaType::Csv)
        } else if h.ends_with(".json") || h.contains("application/json") {
            Some(MediaType::Json)
        } else if h.ends_with(".pdf") || h.contains("application/pdf") {
            Some(MediaType::Pdf)
        } else if h.ends_with(".html") || h.ends_with(".htm") || h.contains("text/html") {
            Some(MediaType::Html)
        } else if h.ends_with(".txt") || h.contains("text/plain") {
            Some(MediaType::Text)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaType::Csv => "csv",
            MediaType::Json => "json",
            MediaType::Text => "text",
            MediaType::Html => "html",
            MediaType::Pdf => "pdf",
        };
        f.write_str(s)
    }
}

/// One file inside a retrieved document (a download, an attachment, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPart {
    pub name: String,
    pub media: MediaType,
    pub bytes: Vec<u8>,
}

impl DocumentPart {
    pub fn new(name: impl Into<String>, media: MediaType, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            media,
            bytes: bytes.into(),
        }
    }

    /// Decoded text with a leading UTF-8 BOM removed. Invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        let bytes = self.bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&self.bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.iter().all(u8::is_ascii_whitespace)
    }
}

/// Everything retrieved for one fetch, plus where and when it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub source: String,
    /// Human-readable description of what was fetched
    pub locator: String,
    pub retrieved_on: NaiveDate,
    pub period: Option<Period>,
    /// Account identity reported by the session, if any
    pub account: Option<String>,
    pub parts: Vec<DocumentPart>,
}

impl RawDocument {
    pub fn new(source: impl Into<String>, retrieved_on: NaiveDate, parts: Vec<DocumentPart>) -> Self {
        Self {
            source: source.into(),
            locator: String::new(),
            retrieved_on,
            period: None,
            account: None,
            parts,
        }
    }

    /// Single-part convenience constructor.
    pub fn single(
        source: impl Into<String>,
        retrieved_on: NaiveDate,
        media: MediaType,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let source = source.into();
        let part = DocumentPart::new(format!("{source}.{media}"), media, bytes);
        Self::new(source, retrieved_on, vec![part])
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(DocumentPart::is_empty)
    }

    /// Text of the first part, which is all most sources deliver.
    pub fn first_text(&self) -> Option<String> {
        self.parts.first().map(DocumentPart::text)
    }

    /// The date closing the statement: period end, else retrieval date.
    pub fn reference_date(&self) -> NaiveDate {
        self.period.map(|p| p.end).unwrap_or(self.retrieved_on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_strips_bom() {
        let part = DocumentPart::new("a.csv", MediaType::Csv, b"\xEF\xBB\xBFDate,Amount".to_vec());
        assert_eq!(part.text(), "Date,Amount");
    }

    #[test]
    fn test_guess_media() {
        assert_eq!(MediaType::guess("Statement_2024.PDF"), Some(MediaType::Pdf));
        assert_eq!(MediaType::guess("application/json; charset=utf-8"), Some(MediaType::Json));
        assert_eq!(MediaType::guess("blob.bin"), None);
    }

    #[test]
    fn test_empty_document() {
        let d = RawDocument::new(
            "x",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            vec![DocumentPart::new("a", MediaType::Text, b" \n ".to_vec())],
        );
        assert!(d.is_empty());
        let d = RawDocument::new("x", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), vec![]);
        assert!(d.is_empty());
    }
}
