//! Statement exports dropped into a local directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::Local;
use fetcher_core::{Credentials, DocumentPart, FetchError, MediaType, RawDocument};
use regex::Regex;
use tracing::debug;

use super::{wrong_locator, Locator, Session, SessionFactory, SessionKind};
use crate::extract::{to_text, TextExtractor};

#[derive(Debug, Clone)]
pub struct FileQuery {
    /// Matched against the file name only
    pub pattern: Regex,
    pub media: MediaType,
    pub extract_text: bool,
}

pub struct FolderSession {
    dir: Option<PathBuf>,
    extractor: Arc<dyn TextExtractor>,
    opened: bool,
}

impl FolderSession {
    pub fn new(dir: Option<PathBuf>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self { dir, extractor, opened: false }
    }
}

#[async_trait]
impl Session for FolderSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Folder
    }

    async fn open(&mut self, _credentials: &Credentials) -> Result<(), FetchError> {
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| FetchError::Configuration("no statement folder configured".to_string()))?;
        let meta = tokio::fs::metadata(dir)
            .await
            .map_err(|e| FetchError::Configuration(format!("statement folder {}: {e}", dir.display())))?;
        if !meta.is_dir() {
            return Err(FetchError::Configuration(format!("{} is not a directory", dir.display())));
        }
        self.opened = true;
        Ok(())
    }

    async fn fetch_document(&mut self, locator: &Locator) -> Result<RawDocument, FetchError> {
        let Locator::Files(query) = locator else {
            return Err(wrong_locator(SessionKind::Folder, locator));
        };
        let dir = match (&self.dir, self.opened) {
            (Some(dir), true) => dir.clone(),
            _ => return Err(FetchError::Configuration("folder session not opened".to_string())),
        };

        let io_err = |e: std::io::Error| FetchError::TransientConnectivity(format!("{}: {e}", dir.display()));
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err)?;
        let mut newest: Option<(SystemTime, PathBuf, String)> = None;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !query.pattern.is_match(&name) {
                continue;
            }
            let meta = entry.metadata().await.map_err(io_err)?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            // Ties go to the lexically greater name, which is the later date for dated exports.
            let newer = match &newest {
                Some((t, _, n)) => (modified, name.as_str()) > (*t, n.as_str()),
                None => true,
            };
            if newer {
                newest = Some((modified, entry.path(), name));
            }
        }

        let (_, path, name) = newest.ok_or_else(|| {
            FetchError::DocumentNotFound(format!("no file matching {} in {}", query.pattern, dir.display()))
        })?;
        debug!(file = %path.display(), "selected newest export");
        let bytes = tokio::fs::read(&path).await.map_err(io_err)?;

        let part = DocumentPart::new(name, query.media, bytes);
        let part = if query.extract_text { to_text(self.extractor.as_ref(), part).await? } else { part };
        let mut doc = RawDocument::new("", Local::now().date_naive(), vec![part]);
        doc.locator = format!("{} ({})", locator.describe(), path.display());
        Ok(doc)
    }

    async fn close(&mut self) -> Result<(), FetchError> {
        self.opened = false;
        Ok(())
    }

    fn abort(&mut self) {
        self.opened = false;
    }
}

pub struct FolderSessionFactory {
    dir: Option<PathBuf>,
    extractor: Arc<dyn TextExtractor>,
}

impl FolderSessionFactory {
    pub fn new(dir: Option<PathBuf>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self { dir, extractor }
    }
}

impl SessionFactory for FolderSessionFactory {
    fn kind(&self) -> SessionKind {
        SessionKind::Folder
    }

    fn create(&self) -> Result<Box<dyn Session>, FetchError> {
        Ok(Box::new(FolderSession::new(self.dir.clone(), self.extractor.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::testing::FixedText;

    fn query(pattern: &str, extract_text: bool) -> Locator {
        Locator::Files(FileQuery {
            pattern: Regex::new(pattern).unwrap(),
            media: MediaType::guess(pattern).unwrap_or(MediaType::Pdf),
            extract_text,
        })
    }

    #[tokio::test]
    async fn test_missing_folder_is_configuration_error() {
        let mut s = FolderSession::new(None, Arc::new(FixedText("")));
        assert!(matches!(s.open(&Credentials::anonymous()).await, Err(FetchError::Configuration(_))));

        let mut s = FolderSession::new(Some(PathBuf::from("/nonexistent/fetcher")), Arc::new(FixedText("")));
        assert!(matches!(s.open(&Credentials::anonymous()).await, Err(FetchError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_picks_matching_file_and_extracts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();
        std::fs::write(dir.path().join("20240509-statements-4321-.pdf"), b"%PDF-1.4").unwrap();

        let mut s = FolderSession::new(Some(dir.path().to_path_buf()), Arc::new(FixedText("TRANSACTION DETAIL")));
        s.open(&Credentials::anonymous()).await.unwrap();
        let doc = s.fetch_document(&query(r"statements-\d{4}-?\.pdf$", true)).await.unwrap();
        assert_eq!(doc.parts.len(), 1);
        assert_eq!(doc.parts[0].media, MediaType::Text);
        assert_eq!(doc.parts[0].text(), "TRANSACTION DETAIL");
    }

    #[tokio::test]
    async fn test_no_match_is_document_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = FolderSession::new(Some(dir.path().to_path_buf()), Arc::new(FixedText("")));
        s.open(&Credentials::anonymous()).await.unwrap();
        let err = s.fetch_document(&query(r"\.csv$", false)).await.unwrap_err();
        assert!(matches!(err, FetchError::DocumentNotFound(_)));
    }
}
