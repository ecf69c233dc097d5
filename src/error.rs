//! Crate-wide error types.
//!
//! # Design Decisions
//! - Errors carry a discriminated kind plus structured context, so callers
//!   branch on the variant instead of string-matching
//! - Watch errors never escape as faults; they reach application code only
//!   through the registered error callback
//! - Token values are never embedded in error messages

use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the governance plane.
#[derive(Debug, Error)]
pub enum PlaneError {
    /// Invalid configuration field, detected at validate time. Blocks startup.
    #[error("configuration error for field '{field}': {message}")]
    Configuration { field: String, message: String },

    /// Operation attempted before `initialize` completed.
    #[error("governance plane is not initialized")]
    NotInitialized,

    /// Operation attempted after `cleanup_tasks` destroyed the plane.
    #[error("governance plane has been destroyed")]
    Destroyed,

    /// The circuit breaker rejected the call locally.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// A watch subscription failed; handled internally via retry + degrade.
    #[error("watch error for {key}: {message}")]
    Watch { key: String, message: String },

    /// The operation was cancelled explicitly. Never retried.
    #[error("operation cancelled")]
    Cancelled,

    /// All retry attempts were consumed without success.
    #[error("retries exhausted after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    /// Error returned by the control-plane backend itself.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl PlaneError {
    /// Build a watch error for a key.
    pub fn watch(key: impl ToString, message: impl ToString) -> Self {
        PlaneError::Watch {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}
