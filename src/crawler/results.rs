//! Discovery of one day's item identifiers
//!
//! The search page is an infinite scroll with no cursor, so the only way to
//! see every result is to keep scrolling until the item count stops
//! growing, then read one permalink per item.

use crate::browser::{Browser, ElementHandle};
use crate::config::CrawlerConfig;
use crate::crawler::markup;
use crate::crawler::outcome::PageOutcome;
use crate::crawler::retry::{pause, retry_transient, Interrupted, LoadFailure};
use crate::crawler::session::PageSession;
use crate::storage::Owner;
use chrono::NaiveDate;
use futures::FutureExt;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Identifiers found on one day's results page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayResults {
    /// Identifiers in page order, newest first, without duplicates
    pub ids: Vec<String>,

    /// Items whose identifier could not be read
    pub skipped: usize,
}

/// Loads the search page for `day` and collects its identifiers
///
/// Browser failures anywhere in the process restart the whole day's
/// discovery under the session's unbounded retry policy.
///
/// # Arguments
///
/// * `session` - Page session that owns the browser for the day
/// * `base_url` - Site root the search URL is built from
/// * `owner` - Account whose items are searched for
/// * `day` - Calendar day the search is restricted to
/// * `timing` - Scroll and settle delays
///
/// # Returns
///
/// * `Ok(DayResults)` - Identifiers newest first, plus the count of unreadable items
/// * `Err(Interrupted)` - The crawl was cancelled
pub async fn discover_day(
    session: &mut PageSession,
    base_url: &str,
    owner: &Owner,
    day: NaiveDate,
    timing: &CrawlerConfig,
) -> Result<DayResults, Interrupted> {
    let query = markup::search_query(owner, day);
    let url = markup::search_url(base_url, &query);
    let policy = session.retry_policy();
    let timing = timing.clone();

    retry_transient(&policy, session, move |session| {
        let url = url.clone();
        let query = query.clone();
        let timing = timing.clone();
        async move {
            let outcome = session.attempt_load(&url).await?;
            if outcome == PageOutcome::NotFound {
                tracing::warn!("Search page reported not found: {}", url);
                return Ok(DayResults::default());
            }

            let cancel = session.cancel_token().clone();
            let browser = session.browser()?;
            if browser.find_first(&markup::no_results(&query)).await?.is_some() {
                tracing::debug!("No results for \"{}\"", query);
                return Ok(DayResults::default());
            }

            scroll_to_end(browser, &timing, &cancel).await?;
            extract_ids(browser).await
        }
        .boxed()
    })
    .await
}

/// Scrolls until an iteration reveals no new items
///
/// Returns the number of scroll iterations performed.
pub async fn scroll_to_end(
    browser: &dyn Browser,
    timing: &CrawlerConfig,
    cancel: &CancellationToken,
) -> Result<u32, LoadFailure> {
    let item = markup::search_item();
    let mut count = browser.find_all(&item).await?.len();
    let max_scrolls = timing.max_scrolls.max(1);

    for iteration in 1..=max_scrolls {
        browser.execute_script(markup::SCROLL_SCRIPT).await?;
        pause(timing.scroll_delay(), cancel).await?;

        let now = browser.find_all(&item).await?.len();
        tracing::trace!(iteration, before = count, after = now, "Scrolled results");
        if now <= count {
            return Ok(iteration);
        }
        count = now;
    }

    tracing::warn!(
        "Stopped scrolling after {} iterations with {} items visible",
        max_scrolls,
        count
    );
    Ok(max_scrolls)
}

/// Reads one identifier per visible item, in page order
pub async fn extract_ids(browser: &dyn Browser) -> Result<DayResults, LoadFailure> {
    let mut results = DayResults::default();
    let mut seen = HashSet::new();

    for item in browser.find_all(&markup::search_item()).await? {
        match item_id(browser, &item).await? {
            Some(id) => {
                if seen.insert(id.clone()) {
                    results.ids.push(id);
                }
            }
            None => {
                tracing::debug!("Skipping result item without a readable permalink");
                results.skipped += 1;
            }
        }
    }

    Ok(results)
}

/// Identifier from the permalink wrapping an item's timestamp
async fn item_id(browser: &dyn Browser, item: &ElementHandle) -> Result<Option<String>, LoadFailure> {
    let Some(time) = browser.find_first_within(item, &markup::item_time()).await? else {
        return Ok(None);
    };
    let Some(link) = browser.find_first_within(&time, &markup::parent()).await? else {
        return Ok(None);
    };
    let href = browser.attribute(&link, "href").await?;
    Ok(href.as_deref().and_then(status_id))
}

/// Identifier from a permalink such as `/alice/status/111` or a full URL
pub fn status_id(href: &str) -> Option<String> {
    let path = href.split(&['?', '#'][..]).next()?;
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments.find(|s| *s == "status")?;
    let id = segments.next()?;

    if id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(id.to_string())
    } else {
        None
    }
}
