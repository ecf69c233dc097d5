//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::resilience::retry::RetryPolicy;

/// Delay before the given attempt (1-based). Attempt 0 waits nothing.
pub fn delay_for(attempt: u32, policy: &RetryPolicy) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = policy.base_delay.as_millis() as u64;
    let max_ms = policy.max_delay.as_millis() as u64;

    let exponential = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    if !policy.jitter {
        return Duration::from_millis(capped);
    }

    // Jitter: 0 to 10% of the capped delay
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
