//! Authenticated sessions against the external sources.
//!
//! A session is created fresh for every fetch, opened with credentials,
//! asked for documents and closed. The pipeline owns that lifecycle; the
//! implementations here only know how to talk to their kind of source.

pub mod browser;
pub mod folder;
pub mod http;
pub mod mail;
pub mod webdriver;

use std::fmt;

use async_trait::async_trait;
use fetcher_core::{Credentials, FetchError, RawDocument};

pub use browser::{
    BrowserDriver, BrowserOptions, BrowserScript, BrowserSession, BrowserSessionFactory, Capture, DriverFactory,
    HttpDecode, LoginFlow, LoginState, Paging, Readiness, Selector, Step, Submit,
};
pub use folder::{FileQuery, FolderSession, FolderSessionFactory};
pub use http::{IdentityCheck, HttpRequest, HttpSession, HttpSessionFactory};
pub use mail::{GmailSession, GmailSessionFactory, MailQuery};
pub use webdriver::{BrowserKind, WebDriverClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Interactive portal login through a real browser
    Browser,
    /// API token against an HTTP endpoint
    Http,
    /// Mailbox search for report e-mails
    Mail,
    /// Local directory of exported files
    Folder,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionKind::Browser => "browser",
            SessionKind::Http => "http",
            SessionKind::Mail => "mail",
            SessionKind::Folder => "folder",
        };
        f.write_str(s)
    }
}

/// What to retrieve, in the terms of one session kind.
#[derive(Debug, Clone)]
pub enum Locator {
    Browser(BrowserScript),
    Http(HttpRequest),
    Mail(MailQuery),
    Files(FileQuery),
}

impl Locator {
    pub fn kind(&self) -> SessionKind {
        match self {
            Locator::Browser(_) => SessionKind::Browser,
            Locator::Http(_) => SessionKind::Http,
            Locator::Mail(_) => SessionKind::Mail,
            Locator::Files(_) => SessionKind::Folder,
        }
    }

    /// Short text recorded on the retrieved document.
    pub fn describe(&self) -> String {
        match self {
            Locator::Browser(script) => format!("browser: {}", script.name),
            Locator::Http(req) => format!("http: {}", req.url),
            Locator::Mail(q) => format!("mail: {}", q.query),
            Locator::Files(q) => format!("files: {}", q.pattern),
        }
    }
}

#[async_trait]
pub trait Session: Send {
    fn kind(&self) -> SessionKind;

    /// Authenticate. `Authentication` when rejected, `TransientConnectivity`
    /// when the source cannot be reached.
    async fn open(&mut self, credentials: &Credentials) -> Result<(), FetchError>;

    async fn fetch_document(&mut self, locator: &Locator) -> Result<RawDocument, FetchError>;

    /// Release everything the session holds. Called once per session.
    async fn close(&mut self) -> Result<(), FetchError>;

    /// Drop held resources without waiting, after `close` hung.
    fn abort(&mut self);
}

pub trait SessionFactory: Send + Sync {
    fn kind(&self) -> SessionKind;

    /// A fresh, unopened session. Fails only when local resources cannot be set up.
    fn create(&self) -> Result<Box<dyn Session>, FetchError>;
}

pub(crate) fn wrong_locator(kind: SessionKind, locator: &Locator) -> FetchError {
    FetchError::Configuration(format!("{kind} session cannot serve a {} locator", locator.kind()))
}
