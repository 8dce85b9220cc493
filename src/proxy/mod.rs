//! Anonymizing proxy circuit
//!
//! A crawl may route its browser through a local Tor process. The process
//! is started once per run, asked for a fresh exit identity whenever the
//! platform starts refusing us, and killed on exit.

mod ports;
mod tor;

pub use ports::{find_free_port, port_in_use};
pub use tor::TorCircuit;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while starting the proxy process
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No free port found in {start}-{end} after {attempts} attempts")]
    NoFreePort { start: u16, end: u16, attempts: usize },

    #[error("Proxy did not finish bootstrapping within {0} seconds")]
    BootstrapTimeout(u64),

    #[error("Proxy process exited before it was ready: {0}")]
    Exited(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Something that can give the crawl a new outbound identity
///
/// Renewal never fails from the caller's point of view: problems are logged
/// and the crawl carries on with the current identity.
#[async_trait]
pub trait CircuitRotator: Send + Sync {
    async fn renew(&self);
}
