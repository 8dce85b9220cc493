//! Output module for crawl summaries and archive statistics
//!
//! This module handles:
//! - Printing the totals of a finished crawl
//! - Reading archive statistics back from the ledger

pub mod stats;

pub use stats::{compute_statistics, load_statistics, print_statistics, ArchiveStatistics};

use crate::crawler::CrawlReport;

/// Prints the totals of one owner's crawl to stdout
pub fn print_report(report: &CrawlReport) {
    println!("=== @{} ===", report.owner);
    println!("  Days processed: {}", report.days);
    println!("  Items found: {}", report.discovered);
    println!("  Archived: {}", report.archived);
    println!("  Already archived: {}", report.already_present);

    if report.skipped > 0 {
        println!("  Unreadable results: {}", report.skipped);
    }

    if !report.failed.is_empty() {
        println!("  Failed ({}):", report.failed.len());
        for id in &report.failed {
            println!("    - {}", id);
        }
    }
    println!();
}

/// Sums the archived counts of several reports
pub fn total_archived(reports: &[CrawlReport]) -> usize {
    reports.iter().map(|r| r.archived).sum()
}
