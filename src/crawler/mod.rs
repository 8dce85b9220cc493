//! Crawl engine
//!
//! This module contains the resilient crawl logic, including:
//! - Page sessions that retry through rate limits and network failures
//! - Page classification by the banners a rendered page shows
//! - Scroll-driven discovery of one day's item identifiers
//! - Extraction of a single item's record and snapshot
//! - The per-owner, day-by-day scheduler

mod context;
pub mod markup;
mod outcome;
mod record;
mod results;
mod retry;
mod scheduler;
mod session;
mod timestamp;

pub use context::CrawlContext;
pub use outcome::{classify, PageOutcome};
pub use record::{archive_item, capture_item, classify_text, normalize_text, ItemError, ItemOutcome};
pub use results::{discover_day, status_id, DayResults};
pub use retry::{
    pause, retry_bounded, retry_transient, Interrupted, LoadFailure, Retryable, TransientRetry,
};
pub use scheduler::{CrawlReport, CrawlScheduler};
pub use session::PageSession;
pub use timestamp::{
    parse_date_label, parse_joined_caption, snowflake_timestamp, SNOWFLAKE_EPOCH_MS,
};

use crate::ArchiveError;

impl From<Interrupted> for ArchiveError {
    fn from(_: Interrupted) -> Self {
        ArchiveError::Interrupted
    }
}
