//! Report e-mails through the Gmail REST API.
//!
//! The session secret is an OAuth access token with `gmail.readonly` scope;
//! obtaining and refreshing it is left to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Local;
use fetcher_core::{Credentials, DocumentPart, FetchError, MediaType, RawDocument};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use super::{wrong_locator, Locator, Session, SessionFactory, SessionKind};
use crate::extract::{to_text, TextExtractor};
use crate::net;

pub const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1";

/// Messages requested per list page.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct MailQuery {
    /// Gmail search syntax, e.g. `subject:"Kassenzettel" after:2024/01/01`
    pub query: String,
    /// Attachment file names to keep
    pub filename: Regex,
    pub media: MediaType,
    /// Convert PDF attachments to text
    pub extract_text: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    payload: MessagePart,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    filename: String,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    attachment_id: Option<String>,
    data: Option<String>,
}

enum AttachmentBody {
    Remote(String),
    Inline(String),
}

fn matching_attachments(part: &MessagePart, filename: &Regex, out: &mut Vec<(String, AttachmentBody)>) {
    if !part.filename.is_empty() && filename.is_match(&part.filename) {
        if let Some(body) = &part.body {
            if let Some(id) = &body.attachment_id {
                out.push((part.filename.clone(), AttachmentBody::Remote(id.clone())));
            } else if let Some(data) = &body.data {
                out.push((part.filename.clone(), AttachmentBody::Inline(data.clone())));
            }
        }
    }
    for child in &part.parts {
        matching_attachments(child, filename, out);
    }
}

/// Gmail sends URL-safe base64, with or without padding.
fn decode_body(data: &str) -> Result<Vec<u8>, FetchError> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map_err(|e| FetchError::unrecognized(format!("gmail attachment is not base64: {e}"), data))
}

pub struct GmailSession {
    http: reqwest::Client,
    api_base: String,
    extractor: Arc<dyn TextExtractor>,
    token: Option<String>,
    mailbox: Option<String>,
}

impl GmailSession {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            extractor,
            token: None,
            mailbox: None,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, FetchError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| FetchError::Configuration("mail session not opened".to_string()))?;
        let url = format!("{}/users/me/{path}", self.api_base);
        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| net::connectivity(&url, e))?;
        let value = net::json(&url, response).await?;
        serde_json::from_value(value).map_err(|e| FetchError::unrecognized(format!("{url}: {e}"), ""))
    }

    /// Every message matching `query`, across all result pages.
    async fn search(&self, query: &str) -> Result<Vec<MessageRef>, FetchError> {
        let size = PAGE_SIZE.to_string();
        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page: MessageList = {
                let mut params = vec![("q", query), ("maxResults", size.as_str())];
                if let Some(token) = &page_token {
                    params.push(("pageToken", token.as_str()));
                }
                self.get_json("messages", &params).await?
            };
            debug!(found = page.messages.len(), more = page.next_page_token.is_some(), "mail search page");
            messages.extend(page.messages);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) if Some(&next) != page_token.as_ref() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl Session for GmailSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Mail
    }

    async fn open(&mut self, credentials: &Credentials) -> Result<(), FetchError> {
        if credentials.secret().is_empty() {
            return Err(FetchError::Authentication("no Gmail access token".to_string()));
        }
        self.token = Some(credentials.secret().to_string());
        let profile: serde_json::Value = self.get_json("profile", &[]).await?;
        self.mailbox = profile.get("emailAddress").and_then(|v| v.as_str()).map(str::to_string);
        debug!(mailbox = ?self.mailbox, "gmail token accepted");
        Ok(())
    }

    async fn fetch_document(&mut self, locator: &Locator) -> Result<RawDocument, FetchError> {
        let Locator::Mail(query) = locator else {
            return Err(wrong_locator(SessionKind::Mail, locator));
        };

        let messages = self.search(&query.query).await?;
        if messages.is_empty() {
            return Err(FetchError::DocumentNotFound(format!("no mail matches {:?}", query.query)));
        }

        let mut parts = Vec::new();
        for message in &messages {
            let full: Message = self
                .get_json(&format!("messages/{}", message.id), &[("format", "full")])
                .await?;
            let mut found = Vec::new();
            matching_attachments(&full.payload, &query.filename, &mut found);

            for (filename, body) in found {
                let data = match body {
                    AttachmentBody::Inline(data) => data,
                    AttachmentBody::Remote(id) => {
                        let attachment: PartBody = self
                            .get_json(&format!("messages/{}/attachments/{id}", message.id), &[])
                            .await?;
                        attachment.data.unwrap_or_default()
                    }
                };
                let part = DocumentPart::new(filename, query.media, decode_body(&data)?);
                let part = if query.extract_text { to_text(self.extractor.as_ref(), part).await? } else { part };
                parts.push(part);
            }
        }

        if parts.is_empty() {
            return Err(FetchError::DocumentNotFound(format!(
                "{} mail(s) match {:?} but none has a matching attachment",
                messages.len(),
                query.query
            )));
        }
        info!(messages = messages.len(), attachments = parts.len(), "mail attachments retrieved");

        let mut doc = RawDocument::new("", Local::now().date_naive(), parts);
        doc.locator = locator.describe();
        doc.account = self.mailbox.clone();
        Ok(doc)
    }

    async fn close(&mut self) -> Result<(), FetchError> {
        self.token = None;
        Ok(())
    }

    fn abort(&mut self) {
        self.token = None;
    }
}

pub struct GmailSessionFactory {
    http: reqwest::Client,
    api_base: String,
    extractor: Arc<dyn TextExtractor>,
}

impl GmailSessionFactory {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            extractor,
        }
    }
}

impl SessionFactory for GmailSessionFactory {
    fn kind(&self) -> SessionKind {
        SessionKind::Mail
    }

    fn create(&self) -> Result<Box<dyn Session>, FetchError> {
        Ok(Box::new(GmailSession::new(self.http.clone(), self.api_base.clone(), self.extractor.clone())))
    }
}
