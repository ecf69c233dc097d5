//! Watch subsystem: deduplicated change subscriptions per key.
//!
//! # Data Flow
//! ```text
//! consumer calls watch_service / watch_config
//!     → registry returns the single active watcher for that key
//!     → watcher subscribes to the backend change stream
//!     → change event: cache → audit → notification → dependents → health pass
//!     → error event: log → metric → audit → alert → degrade
//!                    → (per-key guard) spawn exactly one retry loop
//! ```
//!
//! # Design Decisions
//! - One structural mutex guards both watcher maps (insert/remove/lookup)
//! - Retry deduplication is an explicit per-key compare-and-set guard; the
//!   guard is cleared by the retry loop itself on every exit path
//! - Events for one key are delivered in backend emission order; a slow
//!   consumer backpressures later events for that key only

pub mod config;
pub mod key;
pub mod registry;
pub mod service;

pub use config::ConfigWatcher;
pub use key::WatchKey;
pub use service::ServiceWatcher;

use std::sync::{Arc, RwLock};

use crate::backend::{ConfigFile, ControlPlaneBackend, Instance};
use crate::cache::SnapshotCache;
use crate::degrade::DegradationController;
use crate::error::PlaneError;
use crate::observability::{AlertSink, AuditSink, PlaneMetrics};
use crate::resilience::RetryPolicy;
use registry::{RetryGuards, WatcherRegistry};

/// Hook invoked after a service change, e.g. a load-balancer refresh.
pub type InstancesRefreshHook = Box<dyn Fn(&str, &[Instance]) + Send + Sync>;

/// Hook invoked after a config change, e.g. a hot-reload trigger.
pub type ConfigReloadHook = Box<dyn Fn(&ConfigFile) + Send + Sync>;

/// Shared state every watcher needs: the backend handle, caches, sinks, the
/// registry itself and the per-key retry guards.
pub struct WatchCore {
    pub backend: Arc<dyn ControlPlaneBackend>,
    pub cache: SnapshotCache,
    pub degradation: DegradationController,
    pub metrics: Arc<PlaneMetrics>,
    pub audit: Arc<dyn AuditSink>,
    pub alerts: Arc<dyn AlertSink>,
    pub retry_policy: RetryPolicy,
    pub namespace: String,
    pub registry: WatcherRegistry,
    pub guards: RetryGuards,
    pub refresh: RwLock<Option<InstancesRefreshHook>>,
    pub reload: RwLock<Option<ConfigReloadHook>>,
}

impl WatchCore {
    /// Create or return the single active service watcher for `name`.
    pub async fn watch_service(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<Arc<ServiceWatcher>, PlaneError> {
        let watcher = self
            .registry
            .get_or_insert_service(name, || Arc::new(ServiceWatcher::new(self, name)));
        watcher.start().await?;
        Ok(watcher)
    }

    /// Create or return the single active config watcher for `(file, group)`.
    pub async fn watch_config(
        self: &Arc<Self>,
        file: &str,
        group: &str,
    ) -> Result<Arc<ConfigWatcher>, PlaneError> {
        let watcher = self
            .registry
            .get_or_insert_config(file, group, || Arc::new(ConfigWatcher::new(self, file, group)));
        watcher.start().await?;
        Ok(watcher)
    }

    /// Stop every active watcher in both families. Fast and local; never
    /// subject to the shutdown timeout.
    pub fn stop_all_watchers(&self) -> (usize, usize) {
        let (services, configs) = self.registry.drain();
        let counts = (services.len(), configs.len());
        for watcher in services {
            watcher.stop();
        }
        for watcher in configs {
            watcher.stop();
        }
        counts
    }
}
