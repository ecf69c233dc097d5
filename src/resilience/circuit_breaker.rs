//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: calls pass through, outcomes are counted
//! - Open: calls fail fast with "circuit breaker is open"
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures/(successes+failures) >= threshold within window
//! Open → Closed: trial call after cool-down succeeds
//! Open → Open: trial call fails; cool-down clock restarts
//! ```
//!
//! # Design Decisions
//! - Half-Open is implicit: Open past the cool-down admits exactly one trial
//!   call; admission restarts the clock under the lock, so concurrent callers
//!   lose the race and are rejected
//! - Counters reset on every state transition and on `force_close`
//! - A single lock guards all state; it is never held across an await

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Breaker state visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

/// Errors produced by a breaker-wrapped call, generic over the operation's
/// error type so callers can branch without downcasting.
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The call was short-circuited; the operation was never invoked.
    #[error("circuit breaker is open")]
    Open,

    /// The operation ran and failed; the failure was recorded.
    #[error("{0}")]
    Operation(E),
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    successes: u64,
    failures: u64,
    window_start: Instant,
    opened_at: Option<Instant>,
}

/// Failure-ratio circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: f64,
    window: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// `threshold` is the failure ratio in (0, 1] that opens the breaker;
    /// `window` doubles as the rolling counter window and the Open cool-down.
    pub fn new(threshold: f64, window: Duration) -> Self {
        let threshold = if threshold > 0.0 && threshold <= 1.0 {
            threshold
        } else {
            warn!(threshold, "failure threshold out of (0, 1], using 0.5");
            0.5
        };
        Self {
            threshold,
            window,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                successes: 0,
                failures: 0,
                window_start: Instant::now(),
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Run `op` under breaker protection.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;

        let result = op().await;
        self.record(result.is_ok());
        result.map_err(CircuitBreakerError::Operation)
    }

    /// Administrative override: reset to Closed and clear counters so pending
    /// teardown-path calls are never blocked by breaker state.
    pub fn force_close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.successes = 0;
        inner.failures = 0;
        inner.opened_at = None;
        inner.window_start = Instant::now();
        info!("circuit breaker force-closed");
    }

    fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(self.window);
                if elapsed >= self.window {
                    // This caller wins the single trial; restarting the clock
                    // here rejects everyone else until the trial resolves.
                    inner.opened_at = Some(Instant::now());
                    debug!("circuit breaker admitting trial call");
                    Ok(())
                } else {
                    Err(CircuitBreakerError::Open)
                }
            }
        }
    }

    fn record(&self, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Open => {
                if success {
                    inner.state = CircuitState::Closed;
                    inner.successes = 0;
                    inner.failures = 0;
                    inner.opened_at = None;
                    inner.window_start = Instant::now();
                    info!("circuit breaker closed after successful trial");
                    metrics::counter!("plane_breaker_transitions_total", "to" => "closed")
                        .increment(1);
                } else {
                    inner.opened_at = Some(Instant::now());
                    debug!("trial call failed, breaker stays open");
                }
            }
            CircuitState::Closed => {
                if inner.window_start.elapsed() > self.window {
                    inner.successes = 0;
                    inner.failures = 0;
                    inner.window_start = Instant::now();
                }
                if success {
                    inner.successes += 1;
                } else {
                    inner.failures += 1;
                }
                let total = inner.successes + inner.failures;
                let ratio = inner.failures as f64 / total as f64;
                if inner.failures > 0 && ratio >= self.threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.successes = 0;
                    inner.failures = 0;
                    warn!(ratio, threshold = self.threshold, "circuit breaker opened");
                    metrics::counter!("plane_breaker_transitions_total", "to" => "open")
                        .increment(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_failure_sequence_opens_at_half_threshold() {
        let breaker = CircuitBreaker::new(0.5, Duration::from_secs(5));

        let ok = breaker.call(|| async { Ok::<_, String>(()) }).await;
        assert!(ok.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = breaker
            .call(|| async { Err::<(), _>("boom".to_string()) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);

        // Third call rejected locally; the operation must not run.
        let result = breaker
            .call(|| async { Ok::<_, String>("should not execute") })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn trial_after_cooldown_closes_on_success() {
        let breaker = CircuitBreaker::new(0.5, Duration::from_millis(20));
        let _ = breaker
            .call(|| async { Err::<(), _>("boom".to_string()) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = breaker.call(|| async { Ok::<_, String>(1) }).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn failed_trial_restarts_cooldown() {
        let breaker = CircuitBreaker::new(0.5, Duration::from_millis(20));
        let _ = breaker
            .call(|| async { Err::<(), _>("boom".to_string()) })
            .await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = breaker
            .call(|| async { Err::<(), _>("still down".to_string()) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);

        // Cool-down restarted; an immediate call is rejected.
        let result = breaker.call(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn force_close_admits_immediately() {
        let breaker = CircuitBreaker::new(0.5, Duration::from_secs(60));
        let _ = breaker
            .call(|| async { Err::<(), _>("boom".to_string()) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.force_close();
        assert_eq!(breaker.state(), CircuitState::Closed);

        let result = breaker.call(|| async { Ok::<_, String>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
