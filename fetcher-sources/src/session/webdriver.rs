//! Minimal W3C WebDriver client (geckodriver, chromedriver) over reqwest.

use std::path::PathBuf;

use async_trait::async_trait;
use fetcher_core::FetchError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::browser::{BrowserDriver, ElementId, Selector};
use crate::net;

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Firefox,
    Chrome,
}

pub struct WebDriverClient {
    base_url: String,
    http: reqwest::Client,
    browser: BrowserKind,
    headless: bool,
    downloads_dir: PathBuf,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

impl WebDriverClient {
    pub fn new(base_url: impl Into<String>, browser: BrowserKind, headless: bool, downloads_dir: PathBuf) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            browser,
            headless,
            downloads_dir,
            session_id: None,
        }
    }

    fn capabilities(&self) -> Value {
        let dir = self.downloads_dir.display().to_string();
        match self.browser {
            BrowserKind::Firefox => {
                let args: Vec<&str> = if self.headless { vec!["-headless"] } else { vec![] };
                json!({
                    "browserName": "firefox",
                    "moz:firefoxOptions": {
                        "args": args,
                        "prefs": {
                            "browser.download.folderList": 2,
                            "browser.download.dir": dir,
                            "browser.download.useDownloadDir": true,
                            "browser.helperApps.neverAsk.saveToDisk": "text/csv,application/csv,application/pdf,application/octet-stream",
                            "pdfjs.disabled": true
                        }
                    }
                })
            }
            BrowserKind::Chrome => {
                let args: Vec<&str> = if self.headless { vec!["--headless=new"] } else { vec![] };
                json!({
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "prefs": {
                            "download.default_directory": dir,
                            "download.prompt_for_download": false,
                            "plugins.always_open_pdf_externally": true
                        }
                    }
                })
            }
        }
    }

    fn session_url(&self, path: &str) -> Result<String, FetchError> {
        let id = self
            .session_id
            .as_deref()
            .ok_or_else(|| FetchError::Configuration("webdriver session not started".to_string()))?;
        Ok(format!("{}/session/{id}{path}", self.base_url))
    }

    /// Send a command and unwrap the `value` member of the reply.
    async fn command(&self, method: reqwest::Method, url: String, body: Option<Value>) -> Result<Value, FetchError> {
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|e| net::connectivity("webdriver", e))?;
        let status = response.status();
        let mut reply: Value = response.json().await.map_err(|e| net::connectivity("webdriver", e))?;
        let value = reply.get_mut("value").map(Value::take).unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(value);
        }
        let wire: WireError = serde_json::from_value(value).unwrap_or(WireError {
            error: status.to_string(),
            message: String::new(),
        });
        Err(wire_error(&wire))
    }

    async fn get(&self, path: &str) -> Result<Value, FetchError> {
        let url = self.session_url(path)?;
        self.command(reqwest::Method::GET, url, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, FetchError> {
        let url = self.session_url(path)?;
        self.command(reqwest::Method::POST, url, Some(body)).await
    }
}

fn wire_error(wire: &WireError) -> FetchError {
    let message = format!("webdriver: {}: {}", wire.error, wire.message);
    match wire.error.as_str() {
        "session not created" | "invalid argument" | "unknown command" => FetchError::Configuration(message),
        _ => FetchError::TransientConnectivity(message),
    }
}

fn element_ref(element: &ElementId) -> Value {
    let mut reference = serde_json::Map::new();
    reference.insert(ELEMENT_KEY.to_string(), Value::String(element.0.clone()));
    Value::Object(reference)
}

fn locator_body(selector: &Selector) -> Value {
    match selector {
        Selector::Css(s) => json!({ "using": "css selector", "value": s }),
        Selector::XPath(s) => json!({ "using": "xpath", "value": s }),
    }
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    async fn start(&mut self) -> Result<(), FetchError> {
        let body = json!({ "capabilities": { "alwaysMatch": self.capabilities() } });
        let url = format!("{}/session", self.base_url);
        let value = self.command(reqwest::Method::POST, url, Some(body)).await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::TransientConnectivity("webdriver returned no session id".to_string()))?;
        debug!(session = id, browser = ?self.browser, "webdriver session started");
        self.session_id = Some(id.to_string());
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
        self.post("/url", json!({ "url": url })).await.map(|_| ())
    }

    async fn current_url(&mut self) -> Result<String, FetchError> {
        Ok(self.get("/url").await?.as_str().unwrap_or_default().to_string())
    }

    async fn find(&mut self, selector: &Selector) -> Result<Option<ElementId>, FetchError> {
        let url = self.session_url("/element")?;
        let request = self.http.post(&url).json(&locator_body(selector));
        let response = request.send().await.map_err(|e| net::connectivity("webdriver", e))?;
        let status = response.status();
        let reply: Value = response.json().await.map_err(|e| net::connectivity("webdriver", e))?;
        let value = reply.get("value").cloned().unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(value.get(ELEMENT_KEY).and_then(Value::as_str).map(|id| ElementId(id.to_string())));
        }
        let wire: WireError = serde_json::from_value(value).unwrap_or(WireError {
            error: status.to_string(),
            message: String::new(),
        });
        if wire.error == "no such element" {
            return Ok(None);
        }
        Err(wire_error(&wire))
    }

    async fn click(&mut self, element: &ElementId) -> Result<(), FetchError> {
        self.post(&format!("/element/{}/click", element.0), json!({})).await.map(|_| ())
    }

    async fn send_keys(&mut self, element: &ElementId, text: &str) -> Result<(), FetchError> {
        self.post(&format!("/element/{}/value", element.0), json!({ "text": text }))
            .await
            .map(|_| ())
    }

    async fn attribute(&mut self, element: &ElementId, name: &str) -> Result<Option<String>, FetchError> {
        let value = self.get(&format!("/element/{}/attribute/{name}", element.0)).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn execute(&mut self, script: &str) -> Result<Value, FetchError> {
        self.post("/execute/sync", json!({ "script": script, "args": [] })).await
    }

    async fn switch_to_frame(&mut self, element: Option<&ElementId>) -> Result<(), FetchError> {
        let id = element.map(element_ref).unwrap_or(Value::Null);
        self.post("/frame", json!({ "id": id })).await.map(|_| ())
    }

    async fn switch_to_newest_window(&mut self) -> Result<(), FetchError> {
        let handles = self.get("/window/handles").await?;
        let newest = handles
            .as_array()
            .and_then(|h| h.last())
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::TransientConnectivity("webdriver reported no windows".to_string()))?
            .to_string();
        self.post("/window", json!({ "handle": newest })).await.map(|_| ())
    }

    async fn page_source(&mut self) -> Result<String, FetchError> {
        Ok(self.get("/source").await?.as_str().unwrap_or_default().to_string())
    }

    async fn cookies(&mut self) -> Result<Vec<(String, String)>, FetchError> {
        let value = self.get("/cookie").await?;
        Ok(value
            .as_array()
            .map(|cookies| {
                cookies
                    .iter()
                    .filter_map(|c| {
                        let name = c.get("name")?.as_str()?;
                        let value = c.get("value")?.as_str()?;
                        Some((name.to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn quit(&mut self) -> Result<(), FetchError> {
        let Some(id) = self.session_id.take() else {
            return Ok(());
        };
        let url = format!("{}/session/{id}", self.base_url);
        self.command(reqwest::Method::DELETE, url, None).await.map(|_| ())
    }

    fn abort(&mut self) {
        let Some(id) = self.session_id.take() else { return };
        let url = format!("{}/session/{id}", self.base_url);
        let http = self.http.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = http.delete(&url).send().await {
                        warn!(error = %e, "webdriver session delete failed after abort");
                    }
                });
            }
            Err(_) => warn!(session = %id, "no runtime to delete webdriver session; browser left running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_carry_download_dir() {
        let client = WebDriverClient::new("http://localhost:4444/", BrowserKind::Firefox, true, PathBuf::from("/tmp/dl"));
        let caps = client.capabilities();
        assert_eq!(caps["browserName"], "firefox");
        assert_eq!(caps["moz:firefoxOptions"]["prefs"]["browser.download.dir"], "/tmp/dl");
        assert_eq!(caps["moz:firefoxOptions"]["args"][0], "-headless");
        assert_eq!(client.base_url, "http://localhost:4444");

        let chrome = WebDriverClient::new("http://localhost:9515", BrowserKind::Chrome, false, PathBuf::from("/tmp/dl"));
        assert!(chrome.capabilities()["goog:chromeOptions"]["args"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_element_reference_shape() {
        let v = element_ref(&ElementId("abc".into()));
        assert_eq!(v[ELEMENT_KEY], "abc");
        assert_eq!(locator_body(&Selector::xpath("//a"))["using"], "xpath");
    }

    #[tokio::test]
    async fn test_commands_need_a_session() {
        let mut client = WebDriverClient::new("http://localhost:4444", BrowserKind::Firefox, true, PathBuf::from("/tmp"));
        assert!(matches!(client.goto("https://x.test").await, Err(FetchError::Configuration(_))));
        // quitting without a session is a no-op
        client.quit().await.unwrap();
    }
}
