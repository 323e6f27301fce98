//! PDF to text, so that statement parsers only ever see text.

use std::process::Stdio;

use async_trait::async_trait;
use fetcher_core::{DocumentPart, FetchError, MediaType};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn pdf_to_text(&self, pdf: &[u8]) -> Result<String, FetchError>;
}

/// Poppler's `pdftotext -layout`, which keeps statement columns aligned.
pub struct PdfToText {
    command: String,
}

impl PdfToText {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

impl Default for PdfToText {
    fn default() -> Self {
        Self::new("pdftotext")
    }
}

#[async_trait]
impl TextExtractor for PdfToText {
    async fn pdf_to_text(&self, pdf: &[u8]) -> Result<String, FetchError> {
        let mut child = Command::new(&self.command)
            .args(["-layout", "-enc", "UTF-8", "-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Configuration(format!("cannot run {}: {e}", self.command)))?;

        // pdftotext reads the whole input before writing anything.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(pdf)
                .await
                .map_err(|e| FetchError::unrecognized(format!("{}: {e}", self.command), ""))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| FetchError::unrecognized(format!("{}: {e}", self.command), ""))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::unrecognized(
                format!("{} exited with {}", self.command, output.status),
                &stderr,
            ));
        }
        debug!(bytes = pdf.len(), "extracted PDF text");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Replace a PDF part by its text; other parts pass through.
pub async fn to_text(extractor: &dyn TextExtractor, part: DocumentPart) -> Result<DocumentPart, FetchError> {
    if part.media != MediaType::Pdf {
        return Ok(part);
    }
    let text = extractor.pdf_to_text(&part.bytes).await?;
    Ok(DocumentPart::new(format!("{}.txt", part.name), MediaType::Text, text))
}
