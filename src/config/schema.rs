//! Configuration schema and bounds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::RetryPolicy;

pub const MIN_WEIGHT: u32 = 1;
pub const MAX_WEIGHT: u32 = 1000;
pub const DEFAULT_WEIGHT: u32 = 100;

pub const MIN_TTL_SECS: u64 = 5;
pub const MAX_TTL_SECS: u64 = 300;
pub const DEFAULT_TTL_SECS: u64 = 30;

pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

pub const MIN_RETRY_TIMES: u32 = 0;
pub const MAX_RETRY_TIMES: u32 = 10;
pub const DEFAULT_RETRY_TIMES: u32 = 3;

pub const MIN_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_NAMESPACE: &str = "default";
pub const MAX_NAMESPACE_LEN: usize = 64;

pub const MIN_TOKEN_LEN: usize = 8;
pub const MAX_TOKEN_LEN: usize = 1024;

/// Recognized configuration options for the governance plane.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaneConfig {
    /// Logical namespace, 1-64 chars of `[a-zA-Z0-9_-]`.
    pub namespace: String,

    /// Backend auth token, 8-1024 chars when present. Never logged.
    pub token: Option<String>,

    /// Instance weight reported on registration.
    pub weight: u32,

    /// Registration TTL in seconds.
    pub ttl_secs: u64,

    /// Backend call timeout in seconds; must be below the TTL.
    pub timeout_secs: u64,

    /// Additional retry attempts for watch re-establishment.
    pub max_retry_times: u32,

    /// Base delay for retry backoff, in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Cap on the retry backoff delay, in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Bound on backend teardown at shutdown, in seconds. Absent or
    /// non-positive falls back to the default, then clamps to [min, max].
    pub shutdown_timeout_secs: Option<i64>,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            token: None,
            weight: DEFAULT_WEIGHT,
            ttl_secs: DEFAULT_TTL_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retry_times: DEFAULT_RETRY_TIMES,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            shutdown_timeout_secs: None,
        }
    }
}

impl PlaneConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Effective shutdown timeout: default when unset or non-positive,
    /// otherwise clamped to the allowed range.
    pub fn shutdown_timeout(&self) -> Duration {
        match self.shutdown_timeout_secs {
            Some(secs) if secs > 0 => {
                Duration::from_secs(secs as u64).clamp(MIN_SHUTDOWN_TIMEOUT, MAX_SHUTDOWN_TIMEOUT)
            }
            _ => DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Retry policy for watch re-establishment.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_times,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_timeout_defaults_and_clamps() {
        let mut config = PlaneConfig::default();
        assert_eq!(config.shutdown_timeout(), DEFAULT_SHUTDOWN_TIMEOUT);

        config.shutdown_timeout_secs = Some(0);
        assert_eq!(config.shutdown_timeout(), DEFAULT_SHUTDOWN_TIMEOUT);

        config.shutdown_timeout_secs = Some(-5);
        assert_eq!(config.shutdown_timeout(), DEFAULT_SHUTDOWN_TIMEOUT);

        config.shutdown_timeout_secs = Some(3600);
        assert_eq!(config.shutdown_timeout(), MAX_SHUTDOWN_TIMEOUT);

        config.shutdown_timeout_secs = Some(15);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(15));
    }
}
