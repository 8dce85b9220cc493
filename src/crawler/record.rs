//! Extraction and persistence of a single item
//!
//! An item page is loaded by identifier, its content container is found
//! from the permalink, and the text, kind, timestamp and a snapshot of the
//! container are captured. The snapshot is stored before the ledger row,
//! so a row always has its image.

use crate::browser::{Browser, ElementHandle};
use crate::config::CrawlerConfig;
use crate::crawler::context::CrawlContext;
use crate::crawler::markup;
use crate::crawler::outcome::PageOutcome;
use crate::crawler::retry::{pause, retry_transient, Interrupted, LoadFailure, Retryable};
use crate::crawler::session::PageSession;
use crate::crawler::timestamp::{parse_date_label, snowflake_timestamp};
use crate::storage::{Kind, Owner, Record, RecordStore, StorageError};
use futures::FutureExt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why one attempt at an item failed
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("content for {id} did not render within {timeout:?}")]
    ContentNotFound { id: String, timeout: Duration },

    #[error("no timestamp could be derived for {id}")]
    MissingTimestamp { id: String },

    #[error("failed to persist {id}: {source}")]
    Persistence {
        id: String,
        #[source]
        source: StorageError,
    },

    #[error("interrupted")]
    Interrupted,
}

impl Retryable for ItemError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ContentNotFound { .. } | Self::MissingTimestamp { .. }
        )
    }
}

impl From<Interrupted> for ItemError {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}

/// Result of archiving one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A new ledger row was written
    Archived(Record),

    /// The ledger already held the identifier
    AlreadyPresent,
}

/// A record and its container snapshot, not yet persisted
#[derive(Debug, Clone)]
pub struct Captured {
    pub record: Record,
    pub png: Vec<u8>,
}

/// Collapses line breaks and runs of whitespace into single spaces
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Original unless the body starts with the reply attribution
pub fn classify_text(text: &str) -> Kind {
    if text.starts_with(markup::REPLY_PREFIX) {
        Kind::Reply
    } else {
        Kind::Original
    }
}

/// Archives one identifier into the context's ledger
///
/// An identifier already in the ledger short-circuits without loading
/// anything.
///
/// # Arguments
///
/// * `ctx` - The owner's crawl context, holding the session and ledger
/// * `id` - Identifier of the item to archive
///
/// # Returns
///
/// * `Ok(ItemOutcome::Archived)` - A snapshot and a new ledger row were written
/// * `Ok(ItemOutcome::AlreadyPresent)` - The ledger already held `id`
/// * `Err(ItemError)` - This attempt failed; see `Retryable` for which failures may be retried
pub async fn archive_item(ctx: &mut CrawlContext, id: &str) -> Result<ItemOutcome, ItemError> {
    if ctx.ledger.contains(id) {
        return Ok(ItemOutcome::AlreadyPresent);
    }

    let started = Instant::now();
    let captured = capture_item(&mut ctx.session, &ctx.base_url, &ctx.owner, id, &ctx.timing).await;
    ctx.session.release().await;
    let Captured { record, png } = captured?;

    let persistence = |source| ItemError::Persistence {
        id: id.to_string(),
        source,
    };
    ctx.ledger.save_snapshot(id, &png).map_err(persistence)?;
    let appended = ctx.ledger.append(&record).map_err(persistence)?;

    let elapsed = started.elapsed();
    if ctx.session.is_anonymized() && elapsed > ctx.timing.slow_load() {
        tracing::info!(id, "Item took {:?}, requesting a new circuit", elapsed);
        ctx.session.rotate().await;
    }

    if appended {
        Ok(ItemOutcome::Archived(record))
    } else {
        Ok(ItemOutcome::AlreadyPresent)
    }
}

/// Loads an item page and captures its record
///
/// Browser failures reload the page under the session's unbounded policy.
/// A container that never renders rotates the circuit and is reported as
/// `ContentNotFound`.
pub async fn capture_item(
    session: &mut PageSession,
    base_url: &str,
    owner: &Owner,
    id: &str,
    timing: &CrawlerConfig,
) -> Result<Captured, ItemError> {
    let url = markup::status_url(base_url, owner, id);
    let policy = session.retry_policy();
    let owner = owner.clone();
    let id = id.to_string();
    let timing = timing.clone();

    let attempt = retry_transient(&policy, session, move |session| {
        let url = url.clone();
        let owner = owner.clone();
        let id = id.clone();
        let timing = timing.clone();
        async move {
            let outcome = session.attempt_load(&url).await?;
            let captured = if outcome == PageOutcome::NotFound {
                Err(ItemError::ContentNotFound {
                    id: id.clone(),
                    timeout: Duration::ZERO,
                })
            } else {
                let cancel = session.cancel_token().clone();
                extract(session.browser()?, &owner, &id, &timing, &cancel).await?
            };

            if let Err(ItemError::ContentNotFound { .. }) = &captured {
                session.rotate().await;
            }
            Ok(captured)
        }
        .boxed()
    })
    .await;

    attempt?
}

/// Reads a record out of a loaded item page
async fn extract(
    browser: &dyn Browser,
    owner: &Owner,
    id: &str,
    timing: &CrawlerConfig,
    cancel: &CancellationToken,
) -> Result<Result<Captured, ItemError>, LoadFailure> {
    let not_found = || ItemError::ContentNotFound {
        id: id.to_string(),
        timeout: timing.content_timeout(),
    };

    let Some(link) = wait_for_permalink(browser, owner, id, timing, cancel).await? else {
        return Ok(Err(not_found()));
    };
    let Some(container) = browser.ancestor(&link, markup::CONTAINER_DEPTH).await? else {
        return Ok(Err(not_found()));
    };

    let (kind, text) = read_body(browser, &container).await?;

    let timestamp = match snowflake_timestamp(id) {
        Some(ts) => ts,
        None => match read_date_label(browser, &link).await? {
            Some(ts) => ts,
            None => return Ok(Err(ItemError::MissingTimestamp { id: id.to_string() })),
        },
    };

    let png = browser.screenshot(&container).await?;

    Ok(Ok(Captured {
        record: Record {
            id: id.to_string(),
            timestamp,
            kind,
            text,
        },
        png,
    }))
}

/// Polls for the item's permalink until the content timeout passes
async fn wait_for_permalink(
    browser: &dyn Browser,
    owner: &Owner,
    id: &str,
    timing: &CrawlerConfig,
    cancel: &CancellationToken,
) -> Result<Option<ElementHandle>, LoadFailure> {
    let locator = markup::permalink(owner, id);
    let deadline = Instant::now() + timing.content_timeout();

    loop {
        if let Some(link) = browser.find_first(&locator).await? {
            return Ok(Some(link));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        pause(timing.poll_interval().min(deadline - now), cancel).await?;
    }
}

/// Kind and normalized body text of a content container
async fn read_body(
    browser: &dyn Browser,
    container: &ElementHandle,
) -> Result<(Kind, String), LoadFailure> {
    let text = read_text(browser, container, &markup::item_text()).await?;

    match classify_text(&text) {
        Kind::Reply => {
            let reply = read_text(browser, container, &markup::reply_text()).await?;
            Ok((Kind::Reply, reply))
        }
        Kind::Original => Ok((Kind::Original, text)),
    }
}

async fn read_text(
    browser: &dyn Browser,
    container: &ElementHandle,
    locator: &crate::browser::Locator,
) -> Result<String, LoadFailure> {
    match browser.find_first_within(container, locator).await? {
        Some(element) => Ok(normalize_text(&browser.text(&element).await?)),
        None => Ok(String::new()),
    }
}

/// First parseable date label under the permalink
async fn read_date_label(
    browser: &dyn Browser,
    link: &ElementHandle,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, LoadFailure> {
    for label in browser.find_all_within(link, &markup::date_label()).await? {
        let text = browser.text(&label).await?;
        if let Some(ts) = parse_date_label(&text) {
            return Ok(Some(ts));
        }
    }
    Ok(None)
}
