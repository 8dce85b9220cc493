//! Browser automation seam
//!
//! The crawler only needs a small element-query surface from a rendering
//! browser: navigate, find elements (globally or under another element),
//! read text and attributes, run a script, and capture an element snapshot.
//! This module defines that surface as the `Browser` trait and provides a
//! W3C WebDriver implementation.

mod webdriver;

#[cfg(test)]
pub(crate) mod fake;

pub use webdriver::{SocksProxy, WebDriverBrowser, WebDriverLauncher};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the browser layer
///
/// The crawl engine treats every one of these as a connectivity failure.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("WebDriver transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WebDriver error {error} (HTTP {status}): {message}")]
    Protocol {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Unexpected WebDriver response: {0}")]
    Decode(String),

    #[error("No browser session is open")]
    NoSession,
}

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserError>;

/// How to find an element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// WebDriver locator strategy name
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::Css(_) => "css selector",
            Self::XPath(_) => "xpath",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Css(v) | Self::XPath(v) => v,
        }
    }
}

/// Relative XPath that climbs `levels` parents from an element
pub fn ancestor_locator(levels: usize) -> Locator {
    let path = vec![".."; levels.max(1)].join("/");
    Locator::XPath(path)
}

/// Opaque reference to an element in the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

/// Rendering browser surface used by the crawl engine
#[async_trait]
pub trait Browser: Send + Sync {
    /// Navigates to a URL and waits for the browser to report the load
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    /// First element matching the locator, or `None`
    async fn find_first(&self, locator: &Locator) -> BrowserResult<Option<ElementHandle>>;

    /// Every element matching the locator, in document order
    async fn find_all(&self, locator: &Locator) -> BrowserResult<Vec<ElementHandle>>;

    /// First element under `parent` matching the locator, or `None`
    async fn find_first_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> BrowserResult<Option<ElementHandle>>;

    /// Every element under `parent` matching the locator
    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> BrowserResult<Vec<ElementHandle>>;

    /// Runs a synchronous script in the page and returns its result
    async fn execute_script(&self, script: &str) -> BrowserResult<serde_json::Value>;

    /// Rendered text of an element
    async fn text(&self, element: &ElementHandle) -> BrowserResult<String>;

    /// Attribute value of an element, `None` if the attribute is absent
    async fn attribute(&self, element: &ElementHandle, name: &str)
        -> BrowserResult<Option<String>>;

    /// PNG snapshot of an element
    async fn screenshot(&self, element: &ElementHandle) -> BrowserResult<Vec<u8>>;

    /// Serialized DOM of the current page
    async fn page_source(&self) -> BrowserResult<String>;

    /// Ends the session; the handle must not be used afterwards
    async fn quit(&self) -> BrowserResult<()>;

    /// The element `levels` parents above `element`
    async fn ancestor(
        &self,
        element: &ElementHandle,
        levels: usize,
    ) -> BrowserResult<Option<ElementHandle>> {
        self.find_first_within(element, &ancestor_locator(levels))
            .await
    }
}

/// Starts new browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Box<dyn Browser>>;
}
