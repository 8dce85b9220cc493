//! Top-level control loop for one owner
//!
//! The scheduler walks the crawl window one calendar day at a time:
//!
//! ```text
//! Idle -> ResolvingStartDate -> CrawlingDay(d) -> Advancing(d) -> CrawlingDay(d + 1) ... -> Done
//! ```
//!
//! The checkpoint is written in `Advancing`, after every item of the day
//! was attempted, and holds the day just finished. A resumed crawl starts
//! at that day again; already archived items are skipped by the ledger.

use crate::crawler::context::CrawlContext;
use crate::crawler::markup;
use crate::crawler::outcome::PageOutcome;
use crate::crawler::record::{archive_item, ItemError, ItemOutcome};
use crate::crawler::results::discover_day;
use crate::crawler::retry::{retry_bounded, retry_transient, Interrupted};
use crate::crawler::session::PageSession;
use crate::crawler::timestamp::parse_joined_caption;
use crate::state::{CrawlPhase, CrawlWindow};
use crate::storage::Owner;
use crate::ArchiveError;
use chrono::NaiveDate;
use futures::FutureExt;

/// Totals for one owner's crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub owner: Owner,

    /// Days fully processed
    pub days: u32,

    /// Identifiers found on results pages
    pub discovered: usize,

    /// New ledger rows written
    pub archived: usize,

    /// Identifiers that were already in the ledger
    pub already_present: usize,

    /// Identifiers that exhausted their attempts
    pub failed: Vec<String>,

    /// Result items whose identifier could not be read
    pub skipped: usize,
}

impl CrawlReport {
    fn new(owner: Owner) -> Self {
        Self {
            owner,
            days: 0,
            discovered: 0,
            archived: 0,
            already_present: 0,
            failed: Vec::new(),
            skipped: 0,
        }
    }
}

/// Drives one owner's crawl through its phases
pub struct CrawlScheduler {
    ctx: CrawlContext,
    phase: CrawlPhase,
    start: Option<NaiveDate>,
    end: NaiveDate,
    ignore_checkpoint: bool,
    report: CrawlReport,
}

impl CrawlScheduler {
    /// Creates a scheduler for `[start, end]`
    ///
    /// Without an explicit start the crawl resumes from the checkpoint, or
    /// else from the owner's join date. An explicit start after `end` is
    /// rejected.
    pub fn new(
        ctx: CrawlContext,
        start: Option<NaiveDate>,
        end: NaiveDate,
        ignore_checkpoint: bool,
    ) -> crate::Result<Self> {
        if let Some(start) = start {
            CrawlWindow::new(start, end)?;
        }

        let report = CrawlReport::new(ctx.owner.clone());
        Ok(Self {
            ctx,
            phase: CrawlPhase::Idle,
            start,
            end,
            ignore_checkpoint,
            report,
        })
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn context(&self) -> &CrawlContext {
        &self.ctx
    }

    pub fn into_context(self) -> CrawlContext {
        self.ctx
    }

    /// Runs the crawl to the end of the window
    pub async fn run(&mut self) -> crate::Result<CrawlReport> {
        self.transition(CrawlPhase::ResolvingStartDate);
        let first = self.resolve_start().await?;

        if first > self.end {
            tracing::info!(
                owner = %self.ctx.owner,
                "Start {} is after end {}, nothing to crawl",
                first,
                self.end
            );
            self.transition(CrawlPhase::Done);
            return Ok(self.report.clone());
        }

        let window = CrawlWindow::new(first, self.end)?;
        tracing::info!(
            owner = %self.ctx.owner,
            "Crawling {} to {}",
            window.start(),
            window.end()
        );

        for day in window.days() {
            self.ensure_running()?;
            self.transition(CrawlPhase::CrawlingDay(day));
            self.crawl_day(day).await?;

            self.transition(CrawlPhase::Advancing(day));
            self.ctx.checkpoint.save(day)?;
            self.report.days += 1;
        }

        self.transition(CrawlPhase::Done);
        tracing::info!(
            owner = %self.ctx.owner,
            "Finished! {} archived, {} already present, {} failed over {} day(s)",
            self.report.archived,
            self.report.already_present,
            self.report.failed.len(),
            self.report.days
        );
        Ok(self.report.clone())
    }

    fn transition(&mut self, next: CrawlPhase) {
        debug_assert!(
            self.phase.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        tracing::debug!(owner = %self.ctx.owner, "{} -> {}", self.phase, next);
        self.phase = next;
    }

    fn ensure_running(&self) -> crate::Result<()> {
        if self.ctx.is_interrupted() {
            Err(ArchiveError::Interrupted)
        } else {
            Ok(())
        }
    }

    async fn resolve_start(&mut self) -> crate::Result<NaiveDate> {
        if let Some(start) = self.start {
            tracing::info!(owner = %self.ctx.owner, "Starting at {}", start);
            return Ok(start);
        }

        if self.ignore_checkpoint {
            tracing::info!(owner = %self.ctx.owner, "Ignoring existing checkpoint");
        } else if let Some(day) = self.ctx.checkpoint.load()? {
            tracing::info!(owner = %self.ctx.owner, "Checkpoint found, resuming at {}", day);
            return Ok(day);
        }

        let joined = joined_date(&mut self.ctx.session, &self.ctx.base_url, &self.ctx.owner).await;
        self.ctx.session.release().await;

        match joined? {
            Some(day) => {
                tracing::info!(owner = %self.ctx.owner, "Account created {}, starting there", day);
                Ok(day)
            }
            None => Err(ArchiveError::ProfileNotFound {
                owner: self.ctx.owner.to_string(),
            }),
        }
    }

    async fn crawl_day(&mut self, day: NaiveDate) -> crate::Result<()> {
        let results = discover_day(
            &mut self.ctx.session,
            &self.ctx.base_url,
            &self.ctx.owner,
            day,
            &self.ctx.timing,
        )
        .await;
        self.ctx.session.release().await;
        let results = results?;

        tracing::info!(
            owner = %self.ctx.owner,
            date = %day,
            "{} item(s) found",
            results.ids.len()
        );
        self.report.discovered += results.ids.len();
        self.report.skipped += results.skipped;

        let max_attempts = self.ctx.timing.max_retries;

        // Pages list newest first; archive oldest first.
        for id in results.ids.iter().rev() {
            self.ensure_running()?;

            let outcome = retry_bounded(max_attempts, &mut self.ctx, |ctx, attempt| {
                let id = id.clone();
                async move {
                    let result = archive_item(ctx, &id).await;
                    if let Err(e) = &result {
                        if !matches!(e, ItemError::Interrupted) {
                            tracing::warn!(
                                owner = %ctx.owner,
                                date = %day,
                                id = %id,
                                attempt,
                                "Item attempt failed: {}",
                                e
                            );
                        }
                    }
                    result
                }
                .boxed()
            })
            .await;

            match outcome {
                Ok(ItemOutcome::Archived(record)) => {
                    tracing::info!(
                        owner = %self.ctx.owner,
                        date = %day,
                        id = %record.id,
                        kind = record.kind.to_code(),
                        "Archived"
                    );
                    self.report.archived += 1;
                }
                Ok(ItemOutcome::AlreadyPresent) => {
                    tracing::debug!(owner = %self.ctx.owner, id = %id, "Already archived");
                    self.report.already_present += 1;
                }
                Err(ItemError::Interrupted) => return Err(ArchiveError::Interrupted),
                Err(e) => {
                    tracing::error!(
                        owner = %self.ctx.owner,
                        date = %day,
                        id = %id,
                        attempts = max_attempts,
                        "Giving up on item: {}",
                        e
                    );
                    self.report.failed.push(id.clone());
                }
            }
        }

        Ok(())
    }
}

/// Reads the account creation month from the owner's profile page
///
/// Returns `None` when the profile does not exist or shows no join caption.
async fn joined_date(
    session: &mut PageSession,
    base_url: &str,
    owner: &Owner,
) -> Result<Option<NaiveDate>, Interrupted> {
    let url = markup::profile_url(base_url, owner);
    let policy = session.retry_policy();

    retry_transient(&policy, session, move |session| {
        let url = url.clone();
        async move {
            if session.attempt_load(&url).await? == PageOutcome::NotFound {
                return Ok(None);
            }

            let browser = session.browser()?;
            match browser.find_first(&markup::joined_caption()).await? {
                Some(caption) => Ok(parse_joined_caption(&browser.text(&caption).await?)),
                None => Ok(None),
            }
        }
        .boxed()
    })
    .await
}
