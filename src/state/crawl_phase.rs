/// Phase definitions for one owner's crawl
///
/// This module defines every phase the crawl scheduler can be in, and the
/// transitions it is allowed to make between them.
use chrono::NaiveDate;
use std::fmt;

/// Represents the current phase of an owner's crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Nothing has happened yet
    Idle,

    /// Choosing the first day: explicit start, checkpoint, or join date
    ResolvingStartDate,

    /// Discovering and archiving the items of one calendar day
    CrawlingDay(NaiveDate),

    /// The day is done; writing the checkpoint and moving to the next day
    Advancing(NaiveDate),

    /// The window is exhausted
    Done,
}

impl CrawlPhase {
    /// Returns the day this phase is working on, if any
    fn day(&self) -> Option<NaiveDate> {
        match self {
            Self::CrawlingDay(d) | Self::Advancing(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    ///
    /// Days only move forward: `Advancing(d)` may continue to
    /// `CrawlingDay(d + 1)` and nothing else but `Done`.
    pub fn can_transition_to(&self, next: &CrawlPhase) -> bool {
        match (self, next) {
            (Self::Idle, Self::ResolvingStartDate) => true,
            (Self::ResolvingStartDate, Self::CrawlingDay(_)) => true,
            (Self::ResolvingStartDate, Self::Done) => true,
            (Self::CrawlingDay(a), Self::Advancing(b)) => a == b,
            (Self::Advancing(a), Self::CrawlingDay(b)) => a.succ_opt() == Some(*b),
            (Self::Advancing(_), Self::Done) => true,
            _ => false,
        }
    }

    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ResolvingStartDate => "resolving_start_date",
            Self::CrawlingDay(_) => "crawling_day",
            Self::Advancing(_) => "advancing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.day() {
            Some(day) => write!(f, "{}({})", self.name(), day),
            None => f.write_str(self.name()),
        }
    }
}
