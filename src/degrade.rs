//! Degradation handling for persistently failing watches.
//!
//! # Responsibilities
//! - Mark a key degraded when its watch keeps failing
//! - Steer subsequent reads for that key to the cached snapshot
//! - Attempt a registered backup discovery path, best-effort
//! - Notify dependents that the key entered/left degraded mode
//!
//! # Design Decisions
//! - Records are transient and non-persisted; the next clean change event
//!   for the key clears them
//! - Backup discovery failure is non-fatal

use std::sync::{Arc, RwLock};
use std::time::Instant;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::backend::Instance;
use crate::cache::SnapshotCache;
use crate::observability::metrics::PlaneMetrics;
use crate::watch::WatchKey;

/// Optional fallback source of service instances, consulted when a service
/// watch degrades. Returns `None` when it has nothing to offer.
pub type BackupDiscovery = Box<dyn Fn(&str) -> Option<Vec<Instance>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct DegradationRecord {
    pub reason: String,
    pub activated_at: Instant,
}

pub struct DegradationController {
    records: DashMap<WatchKey, DegradationRecord>,
    backup: RwLock<Option<BackupDiscovery>>,
    metrics: Arc<PlaneMetrics>,
}

impl DegradationController {
    pub fn new(metrics: Arc<PlaneMetrics>) -> Self {
        Self {
            records: DashMap::new(),
            backup: RwLock::new(None),
            metrics,
        }
    }

    pub fn set_backup_discovery(&self, backup: BackupDiscovery) {
        *self.backup.write().unwrap() = Some(backup);
    }

    /// Mark `key` degraded. Subsequent reads prefer the cached snapshot.
    pub fn activate(&self, key: &WatchKey, reason: &str, cache: &SnapshotCache) {
        self.records.insert(
            key.clone(),
            DegradationRecord {
                reason: reason.to_string(),
                activated_at: Instant::now(),
            },
        );
        self.metrics.record_degradation();
        warn!(key = %key, reason, fallback = "cache_only", "degradation activated");

        // Backup discovery only applies to the service family.
        if let WatchKey::Service { name } = key {
            if let Some(backup) = self.backup.read().unwrap().as_ref() {
                match backup(name) {
                    Some(instances) => {
                        info!(
                            service = %name,
                            count = instances.len(),
                            "backup discovery refreshed cache"
                        );
                        cache.put_instances(name, instances);
                    }
                    None => {
                        warn!(service = %name, "backup discovery had no instances");
                    }
                }
            }
        }

        metrics::counter!("plane_degradations_total", "key" => key.to_string()).increment(1);
    }

    pub fn is_degraded(&self, key: &WatchKey) -> bool {
        self.records.contains_key(key)
    }

    /// Clear on a clean change event for the key.
    pub fn clear(&self, key: &WatchKey) {
        if let Some((_, record)) = self.records.remove(key) {
            info!(
                key = %key,
                degraded_for = ?record.activated_at.elapsed(),
                "degradation cleared"
            );
        }
    }

    pub fn clear_all(&self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, healthy: bool) -> Instance {
        Instance {
            id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            weight: 100,
            healthy,
            metadata: Default::default(),
        }
    }

    #[test]
    fn activate_then_clean_change_clears() {
        let controller = DegradationController::new(Arc::new(PlaneMetrics::default()));
        let cache = SnapshotCache::new();
        let key = WatchKey::service("orders");

        controller.activate(&key, "watch failed", &cache);
        assert!(controller.is_degraded(&key));

        controller.clear(&key);
        assert!(!controller.is_degraded(&key));
    }

    #[test]
    fn backup_discovery_refreshes_cache_best_effort() {
        let controller = DegradationController::new(Arc::new(PlaneMetrics::default()));
        let cache = SnapshotCache::new();
        let key = WatchKey::service("orders");

        controller.set_backup_discovery(Box::new(|service| {
            assert_eq!(service, "orders");
            Some(vec![instance("backup-1", true)])
        }));

        controller.activate(&key, "watch failed", &cache);
        let cached = cache.instances("orders").expect("backup filled cache");
        assert_eq!(cached[0].id, "backup-1");
    }

    #[test]
    fn failing_backup_is_non_fatal() {
        let controller = DegradationController::new(Arc::new(PlaneMetrics::default()));
        let cache = SnapshotCache::new();
        let key = WatchKey::service("orders");

        controller.set_backup_discovery(Box::new(|_| None));
        controller.activate(&key, "watch failed", &cache);
        assert!(controller.is_degraded(&key));
        assert!(cache.instances("orders").is_none());
    }
}
