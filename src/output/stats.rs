//! Statistics over an owner's archive
//!
//! This module reads an owner's ledger and checkpoint back and summarizes
//! what has been archived so far.

use crate::storage::{Checkpoint, Kind, Ledger, Owner, Record, RecordStore, StorageResult};
use chrono::{DateTime, NaiveDate, Utc};

/// Archive statistics for one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStatistics {
    pub owner: Owner,

    /// Number of ledger rows
    pub total_records: u64,

    /// Rows classified as originals
    pub originals: u64,

    /// Rows classified as replies
    pub replies: u64,

    /// Last fully processed day, if any
    pub checkpoint: Option<NaiveDate>,

    /// Oldest archived timestamp
    pub first: Option<DateTime<Utc>>,

    /// Newest archived timestamp
    pub last: Option<DateTime<Utc>>,

    /// Identifiers whose snapshot file is missing
    pub missing_snapshots: Vec<String>,
}

/// Summarizes records already read from a store
pub fn compute_statistics(
    owner: &Owner,
    records: &[Record],
    checkpoint: Option<NaiveDate>,
    has_snapshot: impl Fn(&str) -> bool,
) -> ArchiveStatistics {
    let originals = records.iter().filter(|r| r.kind == Kind::Original).count() as u64;

    ArchiveStatistics {
        owner: owner.clone(),
        total_records: records.len() as u64,
        originals,
        replies: records.len() as u64 - originals,
        checkpoint,
        first: records.iter().map(|r| r.timestamp).min(),
        last: records.iter().map(|r| r.timestamp).max(),
        missing_snapshots: records
            .iter()
            .filter(|r| !has_snapshot(&r.id))
            .map(|r| r.id.clone())
            .collect(),
    }
}

/// Loads statistics from an owner's ledger and checkpoint
pub fn load_statistics(
    owner: &Owner,
    ledger: &Ledger,
    checkpoint: &Checkpoint,
) -> StorageResult<ArchiveStatistics> {
    let records = ledger.records()?;
    let day = checkpoint.load()?;

    Ok(compute_statistics(owner, &records, day, |id| {
        ledger.has_snapshot(id)
    }))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &ArchiveStatistics) {
    println!("=== @{} ===", stats.owner);
    println!("  Records: {}", stats.total_records);

    let percentage = |count: u64| {
        if stats.total_records > 0 {
            (count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        }
    };
    println!(
        "  Originals: {} ({:.1}%)",
        stats.originals,
        percentage(stats.originals)
    );
    println!(
        "  Replies: {} ({:.1}%)",
        stats.replies,
        percentage(stats.replies)
    );

    match stats.checkpoint {
        Some(day) => println!("  Checkpoint: {}", day),
        None => println!("  Checkpoint: none"),
    }

    if let (Some(first), Some(last)) = (stats.first, stats.last) {
        println!("  First post: {}", first.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("  Last post: {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    if !stats.missing_snapshots.is_empty() {
        println!("  Missing snapshots ({}):", stats.missing_snapshots.len());
        for id in &stats.missing_snapshots {
            println!("    - {}", id);
        }
    }
    println!();
}
