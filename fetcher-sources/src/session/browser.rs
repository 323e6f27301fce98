//! Browser-driven portal sessions.
//!
//! Institutions without an API are scraped through a real browser. The
//! login is described by a [`LoginFlow`] and runs as a small state machine;
//! documents are obtained by replaying a [`BrowserScript`] and capturing its
//! result (a download, an authenticated HTTP call, or the page itself).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Local;
use fetcher_core::{Credentials, DocumentPart, FetchError, MediaType, RawDocument};
use regex::Regex;
use reqwest::header::COOKIE;
use tempfile::TempDir;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{wrong_locator, Locator, Session, SessionFactory, SessionKind};
use crate::net;

/// W3C WebDriver code point for the Enter key.
pub const ENTER_KEY: char = '\u{E007}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Selector::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Selector::XPath(s.into())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css `{s}`"),
            Selector::XPath(s) => write!(f, "xpath `{s}`"),
        }
    }
}

/// Opaque element reference handed out by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementId(pub String);

/// The browser operations a portal session needs.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn start(&mut self) -> Result<(), FetchError>;
    async fn goto(&mut self, url: &str) -> Result<(), FetchError>;
    async fn current_url(&mut self) -> Result<String, FetchError>;
    /// `None` when nothing matches yet.
    async fn find(&mut self, selector: &Selector) -> Result<Option<ElementId>, FetchError>;
    async fn click(&mut self, element: &ElementId) -> Result<(), FetchError>;
    async fn send_keys(&mut self, element: &ElementId, text: &str) -> Result<(), FetchError>;
    async fn attribute(&mut self, element: &ElementId, name: &str) -> Result<Option<String>, FetchError>;
    async fn execute(&mut self, script: &str) -> Result<serde_json::Value, FetchError>;
    /// `None` returns to the top-level document.
    async fn switch_to_frame(&mut self, element: Option<&ElementId>) -> Result<(), FetchError>;
    async fn switch_to_newest_window(&mut self) -> Result<(), FetchError>;
    async fn page_source(&mut self) -> Result<String, FetchError>;
    async fn cookies(&mut self) -> Result<Vec<(String, String)>, FetchError>;
    async fn quit(&mut self) -> Result<(), FetchError>;

    /// Best-effort teardown without awaiting the browser.
    fn abort(&mut self) {}
}

/// How the portal signals a completed login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The browser reached a URL starting with this prefix
    UrlPrefix(String),
    /// An element only shown to signed-in users is present
    Element(Selector),
    /// The browser left URLs starting with this prefix
    UrlLeaves(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submit {
    EnterKey,
    Click(Selector),
}

#[derive(Debug, Clone)]
pub struct LoginFlow {
    pub url: String,
    /// Iframe hosting the login form
    pub frame: Option<Selector>,
    pub username: Selector,
    pub password: Selector,
    pub submit: Submit,
    pub ready: Readiness,
    /// Shown by the portal when it refuses the credentials
    pub rejection: Option<Selector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    AwaitingCredentials,
    /// Credentials submitted; the user may have to confirm on a device
    AwaitingSecondFactor,
    Authenticated,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Navigate; `{var}` placeholders are substituted
    Goto(String),
    Click(Selector),
    Fill(Selector, String),
    WaitFor(Selector),
    WaitForUrl(String),
    ReadAttribute { selector: Selector, attribute: String, var: String },
    Script { script: String, var: String },
    SwitchFrame(Option<Selector>),
    SwitchToNewestWindow,
    Pause(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpDecode {
    Raw,
    /// The body is JSON with the document base64-encoded in this field
    JsonBase64Field(String),
}

/// Offset paging of a JSON list endpoint. Pages are requested until one
/// comes back short; each page becomes its own document part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paging {
    pub offset_param: String,
    pub size_param: String,
    pub page_size: usize,
    /// JSON pointer to the page's item array, e.g. `/list`
    pub items: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// Click the trigger and wait for a new file in the downloads directory
    Download { trigger: Selector, media: MediaType },
    /// GET with the browser's cookies
    Http {
        url: String,
        headers: Vec<(String, String)>,
        decode: HttpDecode,
        media: MediaType,
        paging: Option<Paging>,
    },
    PageSource { media: MediaType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserScript {
    pub name: String,
    pub steps: Vec<Step>,
    pub capture: Capture,
}

impl BrowserScript {
    pub fn new(name: impl Into<String>, steps: Vec<Step>, capture: Capture) -> Self {
        Self { name: name.into(), steps, capture }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Root under which every session gets its own downloads directory
    pub downloads_dir: PathBuf,
    pub poll_interval: Duration,
    pub element_timeout: Duration,
    pub second_factor_timeout: Duration,
}

/// Substitute `{name}` placeholders; an unknown name is a configuration error.
fn render(template: &str, vars: &HashMap<String, String>) -> Result<String, FetchError> {
    let placeholder = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| FetchError::Configuration(e.to_string()))?;
    let mut missing = None;
    let rendered = placeholder.replace_all(template, |caps: &regex::Captures| match vars.get(&caps[1]) {
        Some(v) => v.clone(),
        None => {
            missing.get_or_insert_with(|| caps[1].to_string());
            String::new()
        }
    });
    match missing {
        Some(name) => Err(FetchError::Configuration(format!("unresolved variable {{{name}}} in {template:?}"))),
        None => Ok(rendered.into_owned()),
    }
}

fn is_partial_download(name: &str) -> bool {
    name.ends_with(".part") || name.ends_with(".crdownload") || name.ends_with(".tmp")
}

async fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, FetchError> {
    let io_err = |e: std::io::Error| FetchError::Configuration(format!("downloads dir {}: {e}", dir.display()));
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        if entry.file_type().await.map_err(io_err)?.is_file() {
            out.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    Ok(out)
}

pub struct BrowserSession {
    driver: Box<dyn BrowserDriver>,
    flow: LoginFlow,
    options: BrowserOptions,
    http: reqwest::Client,
    state: LoginState,
    /// Private to this session; removed on close or abort.
    downloads: Option<TempDir>,
}

impl BrowserSession {
    pub fn new(
        driver: Box<dyn BrowserDriver>,
        flow: LoginFlow,
        options: BrowserOptions,
        http: reqwest::Client,
        downloads: TempDir,
    ) -> Self {
        Self {
            driver,
            flow,
            options,
            http,
            state: LoginState::AwaitingCredentials,
            downloads: Some(downloads),
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    pub fn downloads_dir(&self) -> Option<&Path> {
        self.downloads.as_ref().map(TempDir::path)
    }

    fn remove_downloads(&mut self) {
        if let Some(dir) = self.downloads.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(dir = %path.display(), error = %e, "could not remove session downloads");
            }
        }
    }

    async fn wait_for(&mut self, selector: &Selector) -> Result<ElementId, FetchError> {
        let deadline = Instant::now() + self.options.element_timeout;
        loop {
            if let Some(element) = self.driver.find(selector).await? {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(FetchError::TransientConnectivity(format!(
                    "{selector} did not appear within {:?}",
                    self.options.element_timeout
                )));
            }
            sleep(self.options.poll_interval).await;
        }
    }

    async fn is_ready(&mut self) -> Result<bool, FetchError> {
        match &self.flow.ready {
            Readiness::UrlPrefix(prefix) => Ok(self.driver.current_url().await?.starts_with(prefix.as_str())),
            Readiness::UrlLeaves(prefix) => Ok(!self.driver.current_url().await?.starts_with(prefix.as_str())),
            Readiness::Element(selector) => Ok(self.driver.find(selector).await?.is_some()),
        }
    }

    async fn submit_credentials(&mut self, credentials: &Credentials) -> Result<(), FetchError> {
        let flow = self.flow.clone();
        self.driver.goto(&flow.url).await?;
        if let Some(frame) = &flow.frame {
            let element = self.wait_for(frame).await?;
            self.driver.switch_to_frame(Some(&element)).await?;
        }

        let username = self.wait_for(&flow.username).await?;
        self.driver.send_keys(&username, &credentials.identity).await?;
        let password = self.wait_for(&flow.password).await?;
        match &flow.submit {
            Submit::EnterKey => {
                let secret = format!("{}{ENTER_KEY}", credentials.secret());
                self.driver.send_keys(&password, &secret).await?;
            }
            Submit::Click(button) => {
                self.driver.send_keys(&password, credentials.secret()).await?;
                let button = self.wait_for(button).await?;
                self.driver.click(&button).await?;
            }
        }

        if flow.frame.is_some() {
            self.driver.switch_to_frame(None).await?;
        }
        Ok(())
    }

    async fn await_confirmation(&mut self) -> Result<(), FetchError> {
        let timeout = self.options.second_factor_timeout;
        let deadline = Instant::now() + timeout;
        let mut announced = false;
        loop {
            if self.is_ready().await? {
                return Ok(());
            }
            if let Some(marker) = &self.flow.rejection {
                if self.driver.find(marker).await?.is_some() {
                    return Err(FetchError::Authentication(format!("{} rejected the credentials", self.flow.url)));
                }
            }
            if Instant::now() >= deadline {
                return Err(FetchError::Authentication(format!(
                    "login not confirmed within {timeout:?}; second factor still pending"
                )));
            }
            if !announced {
                info!(url = %self.flow.url, "waiting for second-factor confirmation");
                announced = true;
            }
            sleep(self.options.poll_interval).await;
        }
    }

    async fn run_steps(&mut self, steps: &[Step], vars: &mut HashMap<String, String>) -> Result<(), FetchError> {
        for step in steps {
            debug!(?step, "browser step");
            match step {
                Step::Goto(url) => self.driver.goto(&render(url, vars)?).await?,
                Step::Click(selector) => {
                    let element = self.wait_for(selector).await?;
                    self.driver.click(&element).await?;
                }
                Step::Fill(selector, text) => {
                    let element = self.wait_for(selector).await?;
                    self.driver.send_keys(&element, &render(text, vars)?).await?;
                }
                Step::WaitFor(selector) => {
                    self.wait_for(selector).await?;
                }
                Step::WaitForUrl(prefix) => {
                    let prefix = render(prefix, vars)?;
                    let deadline = Instant::now() + self.options.element_timeout;
                    while !self.driver.current_url().await?.starts_with(&prefix) {
                        if Instant::now() >= deadline {
                            return Err(FetchError::TransientConnectivity(format!("page {prefix} not reached")));
                        }
                        sleep(self.options.poll_interval).await;
                    }
                }
                Step::ReadAttribute { selector, attribute, var } => {
                    let element = self.wait_for(selector).await?;
                    let value = self.driver.attribute(&element, attribute).await?.filter(|v| !v.is_empty());
                    let value = value.ok_or_else(|| {
                        FetchError::unrecognized(format!("{selector} has no {attribute} attribute"), "")
                    })?;
                    vars.insert(var.clone(), value);
                }
                Step::Script { script, var } => {
                    let value = match self.driver.execute(script).await? {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => {
                            return Err(FetchError::unrecognized(format!("script for {var} returned null"), script));
                        }
                        other => other.to_string(),
                    };
                    vars.insert(var.clone(), value);
                }
                Step::SwitchFrame(Some(selector)) => {
                    let element = self.wait_for(selector).await?;
                    self.driver.switch_to_frame(Some(&element)).await?;
                }
                Step::SwitchFrame(None) => self.driver.switch_to_frame(None).await?,
                Step::SwitchToNewestWindow => self.driver.switch_to_newest_window().await?,
                Step::Pause(d) => sleep(*d).await,
            }
        }
        Ok(())
    }

    async fn download(&mut self, trigger: &Selector, media: MediaType) -> Result<DocumentPart, FetchError> {
        let dir = self
            .downloads_dir()
            .map(Path::to_path_buf)
            .ok_or_else(|| FetchError::Configuration("browser session already released".to_string()))?;
        let before: HashSet<String> = list_files(&dir).await?.into_iter().map(|(name, _)| name).collect();

        let element = self.wait_for(trigger).await?;
        // Export buttons often close their own window, which the driver reports as an error.
        if let Err(e) = self.driver.click(&element).await {
            debug!(error = %e, "download trigger click reported an error; watching downloads anyway");
        }

        // Bounded by the retrieval timeout around fetch_document.
        loop {
            let files = list_files(&dir).await?;
            let names: HashSet<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
            for (name, path) in &files {
                let in_progress = names.contains(format!("{name}.part").as_str());
                if before.contains(name) || is_partial_download(name) || in_progress {
                    continue;
                }
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| FetchError::TransientConnectivity(format!("read {}: {e}", path.display())))?;
                info!(file = %name, bytes = bytes.len(), "download complete");
                return Ok(DocumentPart::new(name.clone(), media, bytes));
            }
            sleep(self.options.poll_interval).await;
        }
    }

    /// GET `url` with the browser's cookies and the rendered headers.
    async fn http_body(
        &mut self,
        url: &str,
        headers: &[(String, String)],
        query: &[(&str, String)],
        vars: &HashMap<String, String>,
    ) -> Result<Vec<u8>, FetchError> {
        let cookies = self.driver.cookies().await?;
        let cookie_header = cookies.iter().map(|(n, v)| format!("{n}={v}")).collect::<Vec<_>>().join("; ");

        let mut request = self.http.get(url).query(query).header(COOKIE, cookie_header);
        for (name, value) in headers {
            request = request.header(name.as_str(), render(value, vars)?);
        }
        let response = request.send().await.map_err(|e| net::connectivity(url, e))?;
        net::bytes(url, response).await
    }

    async fn http_capture(
        &mut self,
        url: &str,
        headers: &[(String, String)],
        decode: &HttpDecode,
        media: MediaType,
        vars: &HashMap<String, String>,
    ) -> Result<DocumentPart, FetchError> {
        let url = render(url, vars)?;
        let body = self.http_body(&url, headers, &[], vars).await?;

        let bytes = match decode {
            HttpDecode::Raw => body,
            HttpDecode::JsonBase64Field(field) => {
                let text = String::from_utf8_lossy(&body);
                let value: serde_json::Value = serde_json::from_slice(&body)
                    .map_err(|e| FetchError::unrecognized(format!("{url}: invalid JSON: {e}"), &text))?;
                let encoded = value
                    .get(field)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| FetchError::unrecognized(format!("{url}: no {field} field"), &text))?;
                let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(compact)
                    .map_err(|e| FetchError::unrecognized(format!("{url}: {field} is not base64: {e}"), encoded))?
            }
        };
        Ok(DocumentPart::new(capture_name(&url), media, bytes))
    }

    async fn paged_capture(
        &mut self,
        url: &str,
        headers: &[(String, String)],
        paging: &Paging,
        media: MediaType,
        vars: &HashMap<String, String>,
    ) -> Result<Vec<DocumentPart>, FetchError> {
        let url = render(url, vars)?;
        let name = capture_name(&url);
        let mut parts = Vec::new();
        let mut offset = 0;
        loop {
            let query = [
                (paging.offset_param.as_str(), offset.to_string()),
                (paging.size_param.as_str(), paging.page_size.to_string()),
            ];
            let body = self.http_body(&url, headers, &query, vars).await?;
            let page: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
                FetchError::unrecognized(format!("{url}: invalid JSON: {e}"), &String::from_utf8_lossy(&body))
            })?;
            let count = page
                .pointer(&paging.items)
                .and_then(serde_json::Value::as_array)
                .map(Vec::len)
                .ok_or_else(|| {
                    FetchError::unrecognized(format!("{url}: no {} array", paging.items), &String::from_utf8_lossy(&body))
                })?;
            debug!(offset, count, "page retrieved");
            parts.push(DocumentPart::new(format!("{name}-{}", parts.len() + 1), media, body));
            if count == 0 || count < paging.page_size {
                return Ok(parts);
            }
            offset += count;
        }
    }
}

/// Last path segment of a URL, without its query.
fn capture_name(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("capture").to_string()
}

#[async_trait]
impl Session for BrowserSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Browser
    }

    async fn open(&mut self, credentials: &Credentials) -> Result<(), FetchError> {
        if self.state != LoginState::AwaitingCredentials {
            return Err(FetchError::Configuration(format!("cannot log in from state {:?}", self.state)));
        }
        self.driver.start().await?;
        self.submit_credentials(credentials).await?;
        self.state = LoginState::AwaitingSecondFactor;
        self.await_confirmation().await?;
        self.state = LoginState::Authenticated;
        info!(url = %self.flow.url, "browser login complete");
        Ok(())
    }

    async fn fetch_document(&mut self, locator: &Locator) -> Result<RawDocument, FetchError> {
        let Locator::Browser(script) = locator else {
            return Err(wrong_locator(SessionKind::Browser, locator));
        };
        if self.state != LoginState::Authenticated {
            return Err(FetchError::Configuration(format!("browser session not authenticated ({:?})", self.state)));
        }

        let mut vars = HashMap::new();
        self.run_steps(&script.steps, &mut vars).await?;
        let parts = match &script.capture {
            Capture::Download { trigger, media } => vec![self.download(trigger, *media).await?],
            Capture::Http { url, headers, media, paging: Some(paging), .. } => {
                self.paged_capture(url, headers, paging, *media, &vars).await?
            }
            Capture::Http { url, headers, decode, media, paging: None } => {
                vec![self.http_capture(url, headers, decode, *media, &vars).await?]
            }
            Capture::PageSource { media } => {
                let html = self.driver.page_source().await?;
                vec![DocumentPart::new(format!("{}.{media}", script.name), *media, html)]
            }
        };

        let mut doc = RawDocument::new("", Local::now().date_naive(), parts);
        doc.locator = locator.describe();
        Ok(doc)
    }

    async fn close(&mut self) -> Result<(), FetchError> {
        if self.state == LoginState::Closed {
            return Ok(());
        }
        self.state = LoginState::Closed;
        let quit = self.driver.quit().await;
        self.remove_downloads();
        quit
    }

    fn abort(&mut self) {
        self.state = LoginState::Closed;
        self.driver.abort();
        self.remove_downloads();
    }
}

/// Builds a driver whose browser saves downloads into the given directory.
pub type DriverFactory = Arc<dyn Fn(&Path) -> Box<dyn BrowserDriver> + Send + Sync>;

pub struct BrowserSessionFactory {
    flow: LoginFlow,
    options: BrowserOptions,
    http: reqwest::Client,
    driver: DriverFactory,
}

impl BrowserSessionFactory {
    pub fn new(flow: LoginFlow, options: BrowserOptions, http: reqwest::Client, driver: DriverFactory) -> Self {
        Self { flow, options, http, driver }
    }

    /// A session with its own downloads directory under the configured root.
    pub fn session(&self) -> Result<BrowserSession, FetchError> {
        let root = &self.options.downloads_dir;
        let io_err = |e: std::io::Error| FetchError::Configuration(format!("downloads dir {}: {e}", root.display()));
        std::fs::create_dir_all(root).map_err(io_err)?;
        let downloads = tempfile::Builder::new().prefix("session-").tempdir_in(root).map_err(io_err)?;
        debug!(dir = %downloads.path().display(), "session downloads directory");
        let driver = (self.driver)(downloads.path());
        Ok(BrowserSession::new(driver, self.flow.clone(), self.options.clone(), self.http.clone(), downloads))
    }
}

impl SessionFactory for BrowserSessionFactory {
    fn kind(&self) -> SessionKind {
        SessionKind::Browser
    }

    fn create(&self) -> Result<Box<dyn Session>, FetchError> {
        Ok(Box::new(self.session()?))
    }
}
