//! Storage traits and error types
//!
//! This module defines the trait interface for record stores and
//! associated error types.

use crate::storage::Record;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger format error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed ledger row {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("Invalid checkpoint in {path}: '{content}'")]
    InvalidCheckpoint { path: String, content: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for append-only, identifier-deduplicated record stores
///
/// A store never holds two records with the same identifier.
pub trait RecordStore {
    /// Returns true if a record with this identifier is already stored
    fn contains(&self, id: &str) -> bool;

    /// Appends a record durably
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The record was written
    /// * `Ok(false)` - A record with the same identifier already exists; nothing was written
    fn append(&mut self, record: &Record) -> StorageResult<bool>;

    /// Reads every stored record in insertion order
    fn records(&self) -> StorageResult<Vec<Record>>;

    /// Number of distinct identifiers stored
    fn len(&self) -> usize;

    /// Returns true if nothing has been stored yet
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
