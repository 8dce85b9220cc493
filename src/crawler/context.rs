use crate::browser::BrowserLauncher;
use crate::config::{Config, CrawlerConfig};
use crate::crawler::session::PageSession;
use crate::proxy::CircuitRotator;
use crate::storage::{Checkpoint, Ledger, Owner, OwnerPaths, StorageResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything one owner's crawl works with
///
/// One context is built per owner, so owners crawled one after another
/// share nothing but the launcher and the circuit.
pub struct CrawlContext {
    pub owner: Owner,
    pub base_url: String,
    pub timing: CrawlerConfig,
    pub ledger: Ledger,
    pub checkpoint: Checkpoint,
    pub session: PageSession,
}

impl CrawlContext {
    /// Opens the owner's ledger and checkpoint and prepares a page session
    pub fn open(
        owner: Owner,
        config: &Config,
        launcher: Arc<dyn BrowserLauncher>,
        circuit: Option<Arc<dyn CircuitRotator>>,
        cancel: CancellationToken,
    ) -> StorageResult<Self> {
        let paths = OwnerPaths::new(&config.output.data_dir, &owner);
        let checkpoint = Checkpoint::new(paths.checkpoint.clone());
        let ledger = Ledger::open(paths)?;
        let session = PageSession::new(launcher, circuit, &config.crawler, cancel);

        Ok(Self {
            owner,
            base_url: config.platform.base_url.clone(),
            timing: config.crawler.clone(),
            ledger,
            checkpoint,
            session,
        })
    }

    pub fn is_interrupted(&self) -> bool {
        self.session.cancel_token().is_cancelled()
    }

    /// Releases the browser
    pub async fn close(&mut self) {
        self.session.close().await;
    }
}
