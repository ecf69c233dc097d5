//! Resilience primitives guarding outbound backend calls.
//!
//! # Components
//! - `retry`: bounded-retry executor with backoff, cancellable mid-wait
//! - `circuit_breaker`: failure-ratio state machine that fails fast while the
//!   backend is presumed down
//! - `backoff`: shared exponential-backoff-with-jitter calculation
//!
//! # Design Decisions
//! - Retry policy is immutable after construction; the manager holds no
//!   mutable shared state, so concurrent calls need no locking
//! - The breaker's Half-Open phase is modeled as "Open past cool-down admits
//!   exactly one trial call"
//! - Synchronous query paths wrapped by the breaker are not retried
//!   internally; a caller seeing an open breaker backs off on its own

pub mod backoff;
pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use retry::{RetryError, RetryManager, RetryPolicy};
