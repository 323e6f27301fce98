//! Tunables for sessions and the pipeline. Every field has a default, so an
//! empty config file is valid.

use std::path::PathBuf;
use std::time::Duration;

use fetcher_core::FetchError;
use serde::{Deserialize, Serialize};

use crate::orchestrator::RetryPolicy;
use crate::pipeline::Timeouts;
use crate::session::mail::GMAIL_API;
use crate::session::BrowserKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineSection,
    pub browser: BrowserSection,
    pub mail: MailSection,
    pub folders: FolderSection,
    pub viseca: VisecaSection,
    pub extract: ExtractSection,
}

/// Element waits a browser login may need: frame, username, password, submit button.
const LOGIN_ELEMENT_WAITS: u64 = 4;

impl Settings {
    /// Reject combinations that would misbehave at run time.
    ///
    /// A browser login must finish inside the acquire timeout, otherwise a slow
    /// second factor surfaces as a retryable timeout and prompts the user again.
    pub fn validate(&self) -> Result<(), FetchError> {
        let p = &self.pipeline;
        let b = &self.browser;
        if p.parallelism == 0 {
            return Err(FetchError::Configuration("pipeline.parallelism must be at least 1".to_string()));
        }
        if p.max_attempts == 0 {
            return Err(FetchError::Configuration("pipeline.max_attempts must be at least 1".to_string()));
        }
        let login = b
            .second_factor_timeout_secs
            .saturating_add(b.element_timeout_secs.saturating_mul(LOGIN_ELEMENT_WAITS));
        if p.acquire_timeout_secs <= login {
            return Err(FetchError::Configuration(format!(
                "pipeline.acquire_timeout_secs ({}) must exceed browser.second_factor_timeout_secs plus \
                 {LOGIN_ELEMENT_WAITS} x browser.element_timeout_secs ({login})",
                p.acquire_timeout_secs
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub acquire_timeout_secs: u64,
    pub retrieve_timeout_secs: u64,
    pub release_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    /// Adapters fetched concurrently
    pub parallelism: usize,
    /// Window used for `latest`
    pub lookback_days: i64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: 300,
            retrieve_timeout_secs: 120,
            release_timeout_secs: 15,
            max_attempts: 3,
            backoff_ms: 2000,
            parallelism: 1,
            lookback_days: fetcher_core::DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl PipelineSection {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            acquire: Duration::from_secs(self.acquire_timeout_secs),
            retrieve: Duration::from_secs(self.retrieve_timeout_secs),
            release: Duration::from_secs(self.release_timeout_secs),
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub webdriver_url: String,
    pub browser: BrowserKind,
    pub headless: bool,
    /// Where the browser saves exports; defaults to a temp subdirectory
    pub downloads_dir: Option<PathBuf>,
    pub poll_ms: u64,
    pub element_timeout_secs: u64,
    /// How long to wait for a confirmation on the user's phone
    pub second_factor_timeout_secs: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            browser: BrowserKind::default(),
            headless: false,
            downloads_dir: None,
            poll_ms: 500,
            element_timeout_secs: 30,
            second_factor_timeout_secs: 120,
        }
    }
}

impl BrowserSection {
    /// Root of the per-session download directories.
    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("fetcher-downloads"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSection {
    pub api_base: String,
}

impl Default for MailSection {
    fn default() -> Self {
        Self {
            api_base: GMAIL_API.to_string(),
        }
    }
}

/// Directories statement exports are saved into, per source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderSection {
    pub amex: Option<PathBuf>,
    pub chase_debit: Option<PathBuf>,
    pub capital_one: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisecaSection {
    pub card_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSection {
    pub pdftotext: String,
}

impl Default for ExtractSection {
    fn default() -> Self {
        Self {
            pdftotext: "pdftotext".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let s: Settings = toml::from_str(
            r#"
            [pipeline]
            parallelism = 4

            [folders]
            amex = "/home/me/Downloads/amex"
            "#,
        )
        .unwrap();
        assert_eq!(s.pipeline.parallelism, 4);
        assert_eq!(s.pipeline.max_attempts, 3);
        assert_eq!(s.pipeline.timeouts().release, Duration::from_secs(15));
        assert_eq!(s.folders.amex, Some(PathBuf::from("/home/me/Downloads/amex")));
        assert_eq!(s.browser.webdriver_url, "http://localhost:4444");
        assert_eq!(s.mail.api_base, GMAIL_API);
    }

    #[test]
    fn test_acquire_must_cover_a_slow_login() {
        assert!(Settings::default().validate().is_ok());

        let s: Settings = toml::from_str(
            r#"
            [pipeline]
            acquire_timeout_secs = 120

            [browser]
            second_factor_timeout_secs = 120
            "#,
        )
        .unwrap();
        let err = s.validate().unwrap_err();
        assert!(matches!(err, FetchError::Configuration(ref m) if m.contains("acquire_timeout_secs")));

        let mut s = Settings::default();
        s.pipeline.parallelism = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let text = toml::to_string_pretty(&Settings::default()).unwrap();
        assert!(text.contains("[pipeline]"));
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back, Settings::default());
    }
}
