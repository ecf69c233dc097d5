//! Watcher registry and per-key retry guards.
//!
//! # Invariants
//! - At most one Started/Running watcher per key, enforced by the structural
//!   mutex around both maps
//! - At most one live retry loop per key, enforced by the guard map's
//!   compare-and-set insert

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::watch::config::ConfigWatcher;
use crate::watch::key::WatchKey;
use crate::watch::service::ServiceWatcher;

fn config_slot(file: &str, group: &str) -> String {
    format!("{}:{}", file, group)
}

#[derive(Default)]
struct Maps {
    service: HashMap<String, Arc<ServiceWatcher>>,
    config: HashMap<String, Arc<ConfigWatcher>>,
}

/// Owns the per-key watcher maps for both resource families.
#[derive(Default)]
pub struct WatcherRegistry {
    inner: Mutex<Maps>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the watcher for `name`, inserting a fresh one when absent.
    /// Concurrent callers for the same key always receive the same instance.
    pub fn get_or_insert_service(
        &self,
        name: &str,
        make: impl FnOnce() -> Arc<ServiceWatcher>,
    ) -> Arc<ServiceWatcher> {
        let mut maps = self.inner.lock().unwrap();
        Arc::clone(maps.service.entry(name.to_string()).or_insert_with(make))
    }

    pub fn get_or_insert_config(
        &self,
        file: &str,
        group: &str,
        make: impl FnOnce() -> Arc<ConfigWatcher>,
    ) -> Arc<ConfigWatcher> {
        let mut maps = self.inner.lock().unwrap();
        Arc::clone(maps.config.entry(config_slot(file, group)).or_insert_with(make))
    }

    /// Re-insert a watcher that was removed by `stop`, for restart. Fails
    /// when a different watcher already owns the key.
    pub fn adopt_service(&self, watcher: &Arc<ServiceWatcher>) -> bool {
        let mut maps = self.inner.lock().unwrap();
        match maps.service.get(watcher.service_name()) {
            Some(existing) => Arc::ptr_eq(existing, watcher),
            None => {
                maps.service
                    .insert(watcher.service_name().to_string(), Arc::clone(watcher));
                true
            }
        }
    }

    pub fn adopt_config(&self, watcher: &Arc<ConfigWatcher>) -> bool {
        let slot = config_slot(watcher.file_name(), watcher.group_name());
        let mut maps = self.inner.lock().unwrap();
        match maps.config.get(&slot) {
            Some(existing) => Arc::ptr_eq(existing, watcher),
            None => {
                maps.config.insert(slot, Arc::clone(watcher));
                true
            }
        }
    }

    pub fn remove_service(&self, name: &str) {
        self.inner.lock().unwrap().service.remove(name);
    }

    pub fn remove_config(&self, file: &str, group: &str) {
        self.inner.lock().unwrap().config.remove(&config_slot(file, group));
    }

    /// Take every watcher out of both maps. Callers stop them after the lock
    /// is released; `stop` re-entering the registry then finds nothing.
    pub fn drain(&self) -> (Vec<Arc<ServiceWatcher>>, Vec<Arc<ConfigWatcher>>) {
        let mut maps = self.inner.lock().unwrap();
        (
            maps.service.drain().map(|(_, w)| w).collect(),
            maps.config.drain().map(|(_, w)| w).collect(),
        )
    }

}

/// Per-key flags marking a live retry loop.
#[derive(Debug, Default)]
pub struct RetryGuards {
    active: DashMap<WatchKey, ()>,
}

impl RetryGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare-and-set: true when this caller owns the retry loop for `key`.
    pub fn try_acquire(&self, key: &WatchKey) -> bool {
        self.active.insert(key.clone(), ()).is_none()
    }

    /// Cleared by the owning loop on termination.
    pub fn release(&self, key: &WatchKey) {
        self.active.remove(key);
    }

    pub fn is_active(&self, key: &WatchKey) -> bool {
        self.active.contains_key(key)
    }
}
