//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: the phase of one owner's crawl (resolving, crawling a day, advancing, done)
//! - `CrawlWindow`: the inclusive range of calendar days to crawl

mod crawl_phase;
mod window;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use window::{parse_date, CrawlWindow, DATE_FORMAT};
