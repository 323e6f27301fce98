use std::time::Duration;

use fetcher_core::{FetchError, RawDocument};
use tracing::debug;

use crate::session::{Locator, Session};

/// Fetches one document through an open session, within a time bound.
///
/// Retrieval is assumed idempotent: a retried fetch asks for the same
/// document again.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRetriever {
    timeout: Duration,
}

impl DocumentRetriever {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn retrieve(&self, session: &mut dyn Session, locator: &Locator) -> Result<RawDocument, FetchError> {
        let doc = tokio::time::timeout(self.timeout, session.fetch_document(locator))
            .await
            .map_err(|_| FetchError::RetrievalTimeout(self.timeout))??;

        if doc.parts.is_empty() || doc.is_empty() {
            return Err(FetchError::DocumentNotFound(format!("{} returned an empty document", locator.describe())));
        }
        debug!(locator = %doc.locator, parts = doc.parts.len(), "document retrieved");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FileQuery, SessionKind};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use fetcher_core::{Credentials, DocumentPart, MediaType};

    struct Slow(Duration, Vec<u8>);

    #[async_trait]
    impl Session for Slow {
        fn kind(&self) -> SessionKind {
            SessionKind::Folder
        }
        async fn open(&mut self, _: &Credentials) -> Result<(), FetchError> {
            Ok(())
        }
        async fn fetch_document(&mut self, _: &Locator) -> Result<RawDocument, FetchError> {
            tokio::time::sleep(self.0).await;
            let part = DocumentPart::new("a.csv", MediaType::Csv, self.1.clone());
            Ok(RawDocument::new("", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), vec![part]))
        }
        async fn close(&mut self) -> Result<(), FetchError> {
            Ok(())
        }
        fn abort(&mut self) {}
    }

    fn locator() -> Locator {
        Locator::Files(FileQuery {
            pattern: regex::Regex::new(".").unwrap(),
            media: MediaType::Csv,
            extract_text: false,
        })
    }

    #[tokio::test]
    async fn test_timeout() {
        let r = DocumentRetriever::new(Duration::from_millis(10));
        let mut s = Slow(Duration::from_secs(5), b"x".to_vec());
        let err = r.retrieve(&mut s, &locator()).await.unwrap_err();
        assert_eq!(err, FetchError::RetrievalTimeout(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn test_empty_document_is_not_found() {
        let r = DocumentRetriever::new(Duration::from_secs(1));
        let mut s = Slow(Duration::ZERO, b"  \n".to_vec());
        assert!(matches!(r.retrieve(&mut s, &locator()).await, Err(FetchError::DocumentNotFound(_))));

        let mut s = Slow(Duration::ZERO, b"Date,Amount\n".to_vec());
        assert!(r.retrieve(&mut s, &locator()).await.is_ok());
    }
}
