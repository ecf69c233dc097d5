//! Background health pass over cached service snapshots.
//!
//! # Responsibilities
//! - Periodically evaluate the healthy/unhealthy split per cached service
//! - Record health metrics and warn on fully-unhealthy services
//!
//! Runs until the plane's shutdown cancels it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use crate::lifecycle::CancelHandle;
use crate::watch::WatchCore;

pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

pub struct HealthMonitor {
    core: Arc<WatchCore>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(core: Arc<WatchCore>, interval: Duration) -> Self {
        Self { core, interval }
    }

    pub async fn run(self, mut cancel: CancelHandle) {
        info!(interval = ?self.interval, "health monitor starting");
        let mut ticker = time::interval(self.interval);
        // The first tick fires immediately; skip it so a fresh plane does not
        // warn about services it has not cached yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_all(),
                _ = cancel.cancelled() => {
                    info!("health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn check_all(&self) {
        for service in self.core.cache.cached_services() {
            let Some(instances) = self.core.cache.instances(&service) else {
                continue;
            };
            let healthy = instances.iter().filter(|i| i.healthy).count();
            let total = instances.len();

            metrics::counter!(
                "plane_health_checks_total",
                "service" => service.clone(),
                "outcome" => if healthy > 0 || total == 0 { "healthy" } else { "unhealthy" }
            )
            .increment(1);

            if total > 0 && healthy == 0 {
                warn!(service = %service, total, "health pass: no healthy instances");
            } else {
                debug!(service = %service, healthy, total, "health pass");
            }
        }
    }
}
