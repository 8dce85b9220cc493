//! Classification of a rendered page
//!
//! Every load is classified exactly once from the rendered DOM, and the
//! result drives the page session's retry state machine.

use crate::crawler::markup::{MISSING_PAGE_BANNERS, RATE_LIMITED_BANNER, UPSTREAM_ERROR_BANNER};
use scraper::{Html, Selector};
use std::fmt;

/// What a loaded page turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageOutcome {
    /// Normal content
    Healthy,

    /// The platform is throttling this client
    RateLimited,

    /// The platform failed to render the page
    UpstreamError,

    /// The page or account does not exist
    NotFound,
}

impl PageOutcome {
    /// Returns true if the load must be retried on a fresh circuit
    pub fn is_platform_failure(&self) -> bool {
        matches!(self, Self::RateLimited | Self::UpstreamError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::RateLimited => "rate_limited",
            Self::UpstreamError => "upstream_error",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for PageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a rendered page by the banners it shows
///
/// Banners are matched against the full text of `span` elements. Failure
/// banners win over the not-found banner.
pub fn classify(html: &str) -> PageOutcome {
    let document = Html::parse_document(html);
    let Ok(span_selector) = Selector::parse("span") else {
        return PageOutcome::Healthy;
    };

    let mut not_found = false;
    for span in document.select(&span_selector) {
        let text: String = span.text().collect();
        let text = text.trim();

        if text == RATE_LIMITED_BANNER {
            return PageOutcome::RateLimited;
        }
        if text == UPSTREAM_ERROR_BANNER {
            return PageOutcome::UpstreamError;
        }
        if MISSING_PAGE_BANNERS.contains(&text) {
            not_found = true;
        }
    }

    if not_found {
        PageOutcome::NotFound
    } else {
        PageOutcome::Healthy
    }
}
