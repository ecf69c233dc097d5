//! Bounded-time shutdown orchestration.
//!
//! # Sequence
//! 1. restore external control-plane delegation to a no-op default
//! 2. stop the background health-check loop
//! 3. stop every active watcher in both families (fast, local, untimed)
//! 4. close backend connections, bounded by the shutdown timeout; on elapse
//!    warn and proceed, never retry
//! 5. force-close the circuit breaker, record the final cleanup metric
//! 6. release in-memory state (caches, degradation records)

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::backend::ControlPlaneBackend;
use crate::lifecycle::Cancellation;
use crate::observability::PlaneMetrics;
use crate::resilience::CircuitBreaker;
use crate::watch::WatchCore;

/// Everything the orchestrator needs to tear down, taken out of the plane
/// before the run so the plane itself holds no live references afterwards.
pub struct ShutdownContext {
    pub restore_delegation: Option<Box<dyn FnOnce() + Send>>,
    pub health: Option<Cancellation>,
    pub core: Option<Arc<WatchCore>>,
    pub backend: Arc<dyn ControlPlaneBackend>,
    pub breaker: Arc<CircuitBreaker>,
    pub metrics: Arc<PlaneMetrics>,
}

/// Sequences teardown under a clamped deadline. Idempotence lives in the
/// plane's destroyed flag; the orchestrator itself runs at most once.
pub struct ShutdownOrchestrator {
    timeout: Duration,
}

impl ShutdownOrchestrator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn run(self, ctx: ShutdownContext) {
        // 1. New calls stop routing through this subsystem.
        match ctx.restore_delegation {
            Some(restore) => {
                info!("restoring control-plane delegation to default");
                restore();
            }
            None => info!("no delegation registered, nothing to restore"),
        }

        // 2.
        if let Some(health) = ctx.health {
            info!("stopping health check loop");
            health.cancel();
        }

        // 3. Watcher teardown is synchronous and never subject to the timeout.
        if let Some(core) = ctx.core.as_ref() {
            let (services, configs) = core.stop_all_watchers();
            info!(
                service_watchers = services,
                config_watchers = configs,
                "stopped all watchers"
            );
        }

        // 4. Backend teardown is at-most-once: on timeout the close future is
        // abandoned, not retried.
        info!(timeout = ?self.timeout, "closing backend connections");
        match timeout(self.timeout, ctx.backend.close()).await {
            Ok(Ok(())) => info!("backend connections closed"),
            Ok(Err(err)) => warn!(error = %err, "backend close reported an error, proceeding"),
            Err(_) => warn!(
                timeout = ?self.timeout,
                "backend teardown did not finish within the shutdown timeout, proceeding"
            ),
        }

        // 5.
        ctx.breaker.force_close();
        ctx.metrics.record_operation("cleanup", "success");

        // 6.
        if let Some(core) = ctx.core {
            let (instances, configs) = core.cache.clear();
            let degradations = core.degradation.clear_all();
            info!(
                cached_instances = instances,
                cached_configs = configs,
                degradations,
                "released in-memory state"
            );
        }
    }
}
