//! Two-tier retry policy
//!
//! Infrastructure failures (the browser could not load a page, or the
//! platform answered with a rate-limit or error banner) are retried without
//! bound, rotating the circuit and backing off between attempts.
//! Content failures (an item that never rendered) are retried a fixed
//! number of times by the caller. The two tiers are separate combinators
//! so each can be configured and tested on its own.

use crate::browser::BrowserError;
use crate::crawler::outcome::PageOutcome;
use crate::proxy::CircuitRotator;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The crawl was interrupted while waiting or retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Why one page load attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    /// Transport or browser failure
    Connectivity(String),

    /// The platform served a rate-limit or error page
    Platform(PageOutcome),

    /// An interrupt arrived mid-attempt
    Interrupted,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connectivity(reason) => write!(f, "connectivity failure: {}", reason),
            Self::Platform(outcome) => write!(f, "platform failure: {}", outcome),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

impl From<BrowserError> for LoadFailure {
    fn from(e: BrowserError) -> Self {
        Self::Connectivity(e.to_string())
    }
}

impl From<Interrupted> for LoadFailure {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}

/// Sleeps for `duration` unless the token is cancelled first
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), Interrupted> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Interrupted),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Settings for the unbounded tier
#[derive(Clone)]
pub struct TransientRetry {
    pub delay: Duration,
    pub cancel: CancellationToken,
    pub circuit: Option<Arc<dyn CircuitRotator>>,
}

impl TransientRetry {
    /// Asks the attached circuit, if any, for a new identity
    pub async fn rotate(&self) {
        if let Some(circuit) = &self.circuit {
            circuit.renew().await;
        }
    }
}

/// Retries `attempt` until it succeeds or the crawl is interrupted
///
/// After every connectivity or platform failure the circuit is rotated and
/// the policy's delay is waited out. There is no attempt limit.
///
/// # Arguments
///
/// * `policy` - Delay, circuit and cancellation token shared by every attempt
/// * `state` - Mutable state lent to each attempt in turn
/// * `attempt` - Produces one attempt's future
///
/// # Returns
///
/// * `Ok(T)` - The first successful attempt's value
/// * `Err(Interrupted)` - Cancellation was observed before or between attempts
pub async fn retry_transient<S, T, F>(
    policy: &TransientRetry,
    state: &mut S,
    mut attempt: F,
) -> Result<T, Interrupted>
where
    S: Send,
    F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<T, LoadFailure>>,
{
    let mut failures: u64 = 0;
    loop {
        if policy.cancel.is_cancelled() {
            return Err(Interrupted);
        }

        match attempt(state).await {
            Ok(value) => {
                if failures > 0 {
                    tracing::info!("Recovered after {} failed attempt(s)", failures);
                }
                return Ok(value);
            }
            Err(LoadFailure::Interrupted) => return Err(Interrupted),
            Err(failure) => {
                failures += 1;
                tracing::warn!(
                    attempt = failures,
                    "{}; retrying in {:?}",
                    failure,
                    policy.delay
                );
                policy.rotate().await;
                pause(policy.delay, &policy.cancel).await?;
            }
        }
    }
}

/// Failures the bounded tier knows how to judge
pub trait Retryable {
    /// Returns true if another attempt could succeed
    fn is_retryable(&self) -> bool;
}

/// Runs `attempt` up to `max_attempts` times
///
/// Attempts are numbered from 1. A failure that is not retryable is
/// returned at once, as is the last failure once attempts are exhausted.
///
/// # Arguments
///
/// * `max_attempts` - Attempt limit; zero is treated as one
/// * `state` - Mutable state lent to each attempt in turn
/// * `attempt` - Produces the future for the given attempt number
///
/// # Returns
///
/// * `Ok(T)` - The first successful attempt's value
/// * `Err(E)` - A non-retryable failure, or the last one
pub async fn retry_bounded<S, T, E, F>(
    max_attempts: u32,
    state: &mut S,
    mut attempt: F,
) -> Result<T, E>
where
    S: Send,
    E: Retryable + fmt::Display,
    F: for<'a> FnMut(&'a mut S, u32) -> BoxFuture<'a, Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut number = 1;
    loop {
        match attempt(state, number).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && number < max_attempts => {
                tracing::debug!(attempt = number, max_attempts, "Attempt failed: {}", e);
                number += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
