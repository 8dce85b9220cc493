//! W3C WebDriver client
//!
//! Talks JSON over HTTP to a WebDriver server such as geckodriver. Each
//! launched session is one Firefox instance; when a proxy circuit is
//! attached, the session's SOCKS preferences point at it.

use crate::browser::{Browser, BrowserError, BrowserLauncher, BrowserResult, ElementHandle, Locator};
use crate::config::BrowserConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;

/// Key under which WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver error code for a locator that matched nothing
const NO_SUCH_ELEMENT: &str = "no such element";

/// A local SOCKS proxy the browser should route through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksProxy {
    pub host: String,
    pub port: u16,
}

/// Builds the HTTP client used for WebDriver calls
///
/// Navigation over a proxy circuit can take a long time, so the overall
/// timeout is generous while connecting to the local server is not.
fn build_webdriver_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(180))
        .connect_timeout(Duration::from_secs(10))
        .build()
}

/// Firefox session capabilities
fn firefox_capabilities(config: &BrowserConfig, proxy: Option<&SocksProxy>) -> Value {
    let mut args = vec![
        format!("--width={}", config.width),
        format!("--height={}", config.height),
    ];
    if config.headless {
        args.push("-headless".to_string());
    }

    let mut prefs = json!({
        "intl.accept_languages": config.locale,
    });
    if let Some(proxy) = proxy {
        prefs["network.proxy.type"] = json!(1);
        prefs["network.proxy.socks"] = json!(proxy.host);
        prefs["network.proxy.socks_port"] = json!(proxy.port);
        prefs["network.proxy.socks_remote_dns"] = json!(false);
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "firefox",
                "moz:firefoxOptions": {
                    "args": args,
                    "prefs": prefs,
                }
            }
        }
    })
}

/// Unwraps a WebDriver response body into its `value`
///
/// WebDriver reports failures as `{"value": {"error": ..., "message": ...}}`,
/// usually with a non-2xx status.
fn unwrap_value(status: u16, body: &str) -> BrowserResult<Value> {
    let parsed: Value = serde_json::from_str(body).map_err(|e| {
        BrowserError::Decode(format!("HTTP {} with non-JSON body ({}): {}", status, e, truncate(body)))
    })?;

    if let Some(error) = parsed.pointer("/value/error").and_then(Value::as_str) {
        let message = parsed
            .pointer("/value/message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(BrowserError::Protocol {
            status,
            error: error.to_string(),
            message: message.to_string(),
        });
    }

    if !(200..300).contains(&status) {
        return Err(BrowserError::Protocol {
            status,
            error: "unknown error".to_string(),
            message: truncate(body),
        });
    }

    Ok(parsed.get("value").cloned().unwrap_or(Value::Null))
}

fn truncate(body: &str) -> String {
    body.chars().take(240).collect()
}

fn is_no_such_element(err: &BrowserError) -> bool {
    matches!(err, BrowserError::Protocol { error, .. } if error == NO_SUCH_ELEMENT)
}

fn element_from(value: &Value) -> BrowserResult<ElementHandle> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementHandle(id.to_string()))
        .ok_or_else(|| BrowserError::Decode(format!("not an element reference: {}", value)))
}

fn elements_from(value: &Value) -> BrowserResult<Vec<ElementHandle>> {
    value
        .as_array()
        .ok_or_else(|| BrowserError::Decode(format!("not an element list: {}", value)))?
        .iter()
        .map(element_from)
        .collect()
}

/// Starts WebDriver sessions with a fixed set of capabilities
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    client: Client,
    endpoint: String,
    capabilities: Value,
}

impl WebDriverLauncher {
    /// Creates a launcher for the configured server and optional proxy
    pub fn new(config: &BrowserConfig, proxy: Option<SocksProxy>) -> BrowserResult<Self> {
        Ok(Self {
            client: build_webdriver_client()?,
            endpoint: config.webdriver_url.trim_end_matches('/').to_string(),
            capabilities: firefox_capabilities(config, proxy.as_ref()),
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn Browser>> {
        let response = self
            .client
            .post(format!("{}/session", self.endpoint))
            .json(&self.capabilities)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let value = unwrap_value(status, &body)?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Decode(format!("session id missing: {}", truncate(&body))))?;

        tracing::debug!("Started WebDriver session {}", session_id);

        Ok(Box::new(WebDriverBrowser {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.endpoint, session_id),
        }))
    }
}

/// One live WebDriver session
#[derive(Debug)]
pub struct WebDriverBrowser {
    client: Client,
    session_url: String,
}

impl WebDriverBrowser {
    /// Issues a command against this session and returns its `value`
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> BrowserResult<Value> {
        let url = format!("{}{}", self.session_url, path);
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        unwrap_value(status, &text)
    }

    async fn find_one(&self, path: &str, locator: &Locator) -> BrowserResult<Option<ElementHandle>> {
        let body = json!({ "using": locator.strategy(), "value": locator.value() });
        match self.command(Method::POST, path, Some(body)).await {
            Ok(value) => element_from(&value).map(Some),
            Err(e) if is_no_such_element(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_many(&self, path: &str, locator: &Locator) -> BrowserResult<Vec<ElementHandle>> {
        let body = json!({ "using": locator.strategy(), "value": locator.value() });
        match self.command(Method::POST, path, Some(body)).await {
            Ok(value) => elements_from(&value),
            Err(e) if is_no_such_element(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn find_first(&self, locator: &Locator) -> BrowserResult<Option<ElementHandle>> {
        self.find_one("/element", locator).await
    }

    async fn find_all(&self, locator: &Locator) -> BrowserResult<Vec<ElementHandle>> {
        self.find_many("/elements", locator).await
    }

    async fn find_first_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> BrowserResult<Option<ElementHandle>> {
        self.find_one(&format!("/element/{}/element", parent.0), locator)
            .await
    }

    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> BrowserResult<Vec<ElementHandle>> {
        self.find_many(&format!("/element/{}/elements", parent.0), locator)
            .await
    }

    async fn execute_script(&self, script: &str) -> BrowserResult<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn text(&self, element: &ElementHandle) -> BrowserResult<String> {
        let value = self
            .command(Method::GET, &format!("/element/{}/text", element.0), None)
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Decode(format!("element text is not a string: {}", value)))
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> BrowserResult<Option<String>> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/attribute/{}", element.0, name),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn screenshot(&self, element: &ElementHandle) -> BrowserResult<Vec<u8>> {
        let value = self
            .command(Method::GET, &format!("/element/{}/screenshot", element.0), None)
            .await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Decode("screenshot is not a string".to_string()))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| BrowserError::Decode(format!("screenshot is not base64: {}", e)))
    }

    async fn page_source(&self) -> BrowserResult<String> {
        let value = self.command(Method::GET, "/source", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Decode("page source is not a string".to_string()))
    }

    async fn quit(&self) -> BrowserResult<()> {
        let response = self.client.delete(&self.session_url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        unwrap_value(status, &body).map(|_| ())
    }
}
