//! Logging initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default tracing subscriber. Safe to call more than once; later
/// calls are no-ops, which keeps tests independent of ordering.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "planeguard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
