//! Tidemark: an incremental, resumable archiver for a social account's posts
//!
//! This crate walks an owner's public posts one calendar day at a time,
//! through a rendered-browser session that may be routed over a rotating
//! anonymizing proxy, and keeps an append-only, deduplicated ledger plus a
//! day-granularity checkpoint so long crawls can be interrupted and resumed.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod output;
pub mod proxy;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Tidemark operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No owner given and none found under {0}")]
    NoOwner(String),

    #[error("Profile not found for @{owner}")]
    ProfileNotFound { owner: String },

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Interrupted")]
    Interrupted,
}

impl ArchiveError {
    /// Returns true if this error came from an external interrupt
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Tidemark operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlContext, CrawlReport, CrawlScheduler};
pub use state::{CrawlPhase, CrawlWindow};
pub use storage::{Kind, Ledger, Owner, Record};
