//! Token-authenticated JSON APIs.

use async_trait::async_trait;
use chrono::Local;
use fetcher_core::{Credentials, DocumentPart, FetchError, MediaType, RawDocument};
use tracing::debug;

use super::{wrong_locator, Locator, Session, SessionFactory, SessionKind};
use crate::net;

/// Request issued on `open` to validate the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCheck {
    pub url: String,
    /// JSON pointer to the account identity in the response
    pub identity_pointer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub media: MediaType,
}

pub struct HttpSession {
    http: reqwest::Client,
    identity_check: Option<IdentityCheck>,
    token: Option<String>,
    identity: Option<String>,
}

impl HttpSession {
    pub fn new(http: reqwest::Client, identity_check: Option<IdentityCheck>) -> Self {
        Self {
            http,
            identity_check,
            token: None,
            identity: None,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }
}

fn identity_at(value: &serde_json::Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Session for HttpSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Http
    }

    async fn open(&mut self, credentials: &Credentials) -> Result<(), FetchError> {
        let token = credentials.secret();
        if token.is_empty() {
            return Err(FetchError::Authentication("no API token".to_string()));
        }
        self.identity = Some(credentials.identity.clone()).filter(|s| !s.is_empty());

        if let Some(identity_check) = &self.identity_check {
            let response = self
                .http
                .get(&identity_check.url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| net::connectivity(&identity_check.url, e))?;
            let body = net::json(&identity_check.url, response).await?;
            if let Some(pointer) = &identity_check.identity_pointer {
                let identity = identity_at(&body, pointer).ok_or_else(|| {
                    FetchError::unrecognized(format!("{}: no identity at {pointer}", identity_check.url), &body.to_string())
                })?;
                debug!(%identity, "api token accepted");
                self.identity = Some(identity);
            }
        }
        self.token = Some(token.to_string());
        Ok(())
    }

    async fn fetch_document(&mut self, locator: &Locator) -> Result<RawDocument, FetchError> {
        let Locator::Http(request) = locator else {
            return Err(wrong_locator(SessionKind::Http, locator));
        };
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| FetchError::Configuration("http session not opened".to_string()))?;

        let response = self
            .http
            .get(&request.url)
            .query(&request.query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| net::connectivity(&request.url, e))?;
        let body = net::bytes(&request.url, response).await?;

        let name = request.url.rsplit('/').next().unwrap_or("response").to_string();
        let mut doc = RawDocument::new("", Local::now().date_naive(), vec![DocumentPart::new(name, request.media, body)]);
        doc.locator = locator.describe();
        doc.account = self.identity.clone();
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

pub struct HttpSessionFactory {
    http: reqwest::Client,
    identity_check: Option<IdentityCheck>,
}

impl HttpSessionFactory {
    pub fn new(http: reqwest::Client, identity_check: Option<IdentityCheck>) -> Self {
        Self { http, identity_check }
    }
}

impl SessionFactory for HttpSessionFactory {
    fn kind(&self) -> SessionKind {
        SessionKind::Http
    }

    fn create(&self) -> Result<Box<dyn Session>, FetchError> {
        Ok(Box::new(HttpSession::new(self.http.clone(), self.identity_check.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_pointer() {
        let body = json!({"user": {"id": 42, "email": "a@b.test"}});
        assert_eq!(identity_at(&body, "/user/id").as_deref(), Some("42"));
        assert_eq!(identity_at(&body, "/user/email").as_deref(), Some("a@b.test"));
        assert_eq!(identity_at(&body, "/user/missing"), None);
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let mut s = HttpSession::new(reqwest::Client::new(), None);
        let err = s.open(&Credentials::new("me", "")).await.unwrap_err();
        assert!(matches!(err, FetchError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_fetch_before_open() {
        let mut s = HttpSession::new(reqwest::Client::new(), None);
        let locator = Locator::Http(HttpRequest {
            url: "https://api.test/x".into(),
            query: vec![],
            media: MediaType::Json,
        });
        assert!(matches!(s.fetch_document(&locator).await, Err(FetchError::Configuration(_))));
    }
}
