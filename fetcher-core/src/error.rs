//! Error taxonomy shared by every stage of the fetch pipeline.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Longest raw excerpt carried inside an error.
pub const SNIPPET_LEN: usize = 160;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquire,
    Retrieve,
    Parse,
    Normalize,
    Release,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Acquire => "acquire",
            Stage::Retrieve => "retrieve",
            Stage::Parse => "parse",
            Stage::Normalize => "normalize",
            Stage::Release => "release",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Credentials rejected or expired. Never retried automatically.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Source unreachable. Safe to retry.
    #[error("source unreachable: {0}")]
    TransientConnectivity(String),

    /// Source did not answer within the bounded wait. Safe to retry.
    #[error("retrieval timed out after {}s", .0.as_secs())]
    RetrievalTimeout(Duration),

    /// The source has nothing for the requested period.
    #[error("no document found: {0}")]
    DocumentNotFound(String),

    /// The document no longer matches the expected template.
    #[error("unrecognized document format: {message} (near {snippet:?})")]
    UnrecognizedFormat { message: String, snippet: String },

    /// A normalization invariant was violated.
    #[error("invalid {field} {raw:?}: {message}")]
    Validation {
        field: String,
        raw: String,
        message: String,
    },

    /// Missing settings or credentials for a selected source.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification used for retry and reporting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    TransientConnectivity,
    RetrievalTimeout,
    DocumentNotFound,
    UnrecognizedFormat,
    Validation,
    Configuration,
}

impl FetchError {
    pub fn unrecognized(message: impl Into<String>, context: &str) -> Self {
        FetchError::UnrecognizedFormat {
            message: message.into(),
            snippet: snippet(context),
        }
    }

    pub fn validation(
        field: impl Into<String>,
        raw: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        FetchError::Validation {
            field: field.into(),
            raw: raw.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Authentication(_) => ErrorKind::Authentication,
            FetchError::TransientConnectivity(_) => ErrorKind::TransientConnectivity,
            FetchError::RetrievalTimeout(_) => ErrorKind::RetrievalTimeout,
            FetchError::DocumentNotFound(_) => ErrorKind::DocumentNotFound,
            FetchError::UnrecognizedFormat { .. } => ErrorKind::UnrecognizedFormat,
            FetchError::Validation { .. } => ErrorKind::Validation,
            FetchError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Only connectivity problems are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientConnectivity | ErrorKind::RetrievalTimeout
        )
    }
}

/// A failed fetch, with enough context to diagnose without re-running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_id} failed during {stage}: {error}")]
pub struct FetchFailure {
    pub source_id: String,
    pub stage: Stage,
    #[source]
    pub error: FetchError,
}

impl FetchFailure {
    pub fn new(source_id: impl Into<String>, stage: Stage, error: FetchError) -> Self {
        Self {
            source_id: source_id.into(),
            stage,
            error,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// First `SNIPPET_LEN` characters of `text`, whitespace collapsed.
pub fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SNIPPET_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FetchError::TransientConnectivity("dns".into()).is_retryable());
        assert!(FetchError::RetrievalTimeout(Duration::from_secs(5)).is_retryable());
        assert!(!FetchError::Authentication("bad password".into()).is_retryable());
        assert!(!FetchError::DocumentNotFound("none".into()).is_retryable());
        assert!(!FetchError::validation("date", "13/45/2024", "bad").is_retryable());
    }

    #[test]
    fn test_failure_display_names_source_and_stage() {
        let f = FetchFailure::new(
            "viseca",
            Stage::Normalize,
            FetchError::validation("date", "13/45/2024", "input is out of range"),
        );
        let msg = f.to_string();
        assert!(msg.contains("viseca"));
        assert!(msg.contains("normalize"));
        assert!(msg.contains("13/45/2024"));
    }

    #[test]
    fn test_snippet_truncates_and_collapses() {
        let text = format!("a  \n b {}", "x".repeat(500));
        let s = snippet(&text);
        assert!(s.starts_with("a b x"));
        assert_eq!(s.chars().count(), SNIPPET_LEN);
    }
}
