//! Bounded-retry executor.
//!
//! # Responsibilities
//! - Execute a fallible operation up to `1 + max_attempts` times
//! - Separate attempts by (exponential) backoff
//! - Abort immediately when a cancellation signal fires, even mid-backoff
//!
//! # Design Decisions
//! - `max_attempts = 0` means exactly one attempt, no retry, no delay
//! - Cancellation returns a distinct error, never the operation's own error

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::lifecycle::CancelHandle;
use crate::resilience::backoff;

/// Retry behavior. Immutable after construction.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
    /// Add 0-10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

/// Outcome of a retried operation, generic over the operation's error.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error observed.
    #[error("operation failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The cancellation signal fired before or between attempts.
    #[error("operation cancelled")]
    Cancelled,
}

/// Executes operations under a fixed retry policy.
///
/// Holds no mutable state; a single manager is shared freely across tasks.
#[derive(Debug, Clone)]
pub struct RetryManager {
    policy: RetryPolicy,
}

impl RetryManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Convenience constructor with fixed-base exponential backoff.
    pub fn with_attempts(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(RetryPolicy {
            max_attempts,
            base_delay,
            ..RetryPolicy::default()
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `op`, retrying on failure up to the policy's limit.
    ///
    /// Returns the first success, or the last error after `1 + max_attempts`
    /// total invocations.
    pub async fn do_with_retry<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.policy.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last: err,
                    });
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, error = %err, "attempt failed, retrying");
                }
            }
            attempt += 1;
            sleep(backoff::delay_for(attempt, &self.policy)).await;
        }
    }

    /// Like [`do_with_retry`](Self::do_with_retry), but checks `cancel`
    /// before each attempt and wakes immediately if it fires mid-backoff.
    pub async fn do_with_retry_cancel<F, Fut, T, E>(
        &self,
        cancel: &mut CancelHandle,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.policy.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last: err,
                    });
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, error = %err, "attempt failed, retrying");
                }
            }
            attempt += 1;
            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = sleep(backoff::delay_for(attempt, &self.policy)) => {}
            }
        }
    }
}
