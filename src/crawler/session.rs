//! Page session: one browser bound to an optional proxy circuit
//!
//! `load` returns only once a page rendered without a rate-limit or error
//! banner. Every connectivity or platform failure on the way is retried
//! without bound, rotating the circuit between attempts.

use crate::browser::{Browser, BrowserLauncher};
use crate::config::CrawlerConfig;
use crate::crawler::outcome::{classify, PageOutcome};
use crate::crawler::retry::{pause, retry_transient, Interrupted, LoadFailure, TransientRetry};
use crate::proxy::CircuitRotator;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct PageSession {
    launcher: Arc<dyn BrowserLauncher>,
    retry: TransientRetry,
    settle_delay: Duration,
    reuse_browser: bool,
    browser: Option<Box<dyn Browser>>,
}

impl PageSession {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        circuit: Option<Arc<dyn CircuitRotator>>,
        config: &CrawlerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let anonymized = circuit.is_some();
        Self {
            launcher,
            retry: TransientRetry {
                delay: config.retry_delay(),
                cancel,
                circuit,
            },
            settle_delay: config.settle_delay(anonymized),
            reuse_browser: config.reuse_browser,
            browser: None,
        }
    }

    /// Returns true if loads go through a proxy circuit
    pub fn is_anonymized(&self) -> bool {
        self.retry.circuit.is_some()
    }

    /// The unbounded retry policy this session loads with
    pub fn retry_policy(&self) -> TransientRetry {
        self.retry.clone()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.retry.cancel
    }

    /// Requests a new circuit identity, if a circuit is attached
    pub async fn rotate(&self) {
        self.retry.rotate().await;
    }

    /// The browser showing the last loaded page
    pub fn browser(&self) -> Result<&dyn Browser, LoadFailure> {
        self.browser
            .as_deref()
            .ok_or_else(|| LoadFailure::Connectivity("no browser is open".to_string()))
    }

    /// One load attempt, classified
    ///
    /// Unless browsers are reused, every attempt starts a fresh browser.
    /// A browser that failed to navigate is always discarded.
    pub async fn attempt_load(&mut self, url: &str) -> Result<PageOutcome, LoadFailure> {
        if !self.reuse_browser {
            self.close().await;
        }

        if self.browser.is_none() {
            let browser = self.launcher.launch().await?;
            self.browser = Some(browser);
        }

        tracing::debug!("Loading {}", url);
        let navigated = self.browser()?.navigate(url).await;
        if let Err(e) = navigated {
            self.close().await;
            return Err(e.into());
        }

        pause(self.settle_delay, &self.retry.cancel).await?;

        let source = self.browser()?.page_source().await?;
        match classify(&source) {
            outcome if outcome.is_platform_failure() => Err(LoadFailure::Platform(outcome)),
            outcome => Ok(outcome),
        }
    }

    /// Loads a page, retrying until it renders or the crawl is interrupted
    pub async fn load(&mut self, url: &str) -> Result<PageOutcome, Interrupted> {
        let policy = self.retry_policy();
        let url = url.to_string();
        retry_transient(&policy, self, move |session| {
            let url = url.clone();
            async move { session.attempt_load(&url).await }.boxed()
        })
        .await
    }

    /// Closes the browser unless sessions are configured to reuse it
    pub async fn release(&mut self) {
        if !self.reuse_browser {
            self.close().await;
        }
    }

    /// Closes the browser, if one is open
    pub async fn close(&mut self) {
        if let Some(browser) = self.browser.take() {
            if let Err(e) = browser.quit().await {
                tracing::debug!("Browser did not quit cleanly: {}", e);
            }
        }
    }
}
