//! In-memory snapshot cache for watched resources.
//!
//! Holds the last known instance list per service and the last known content
//! per configuration file. Degraded reads are served from here instead of a
//! live backend call. Never persisted.

use std::sync::Arc;

use dashmap::DashMap;

use crate::backend::{ConfigFile, Instance};

fn config_slot(file: &str, group: &str) -> String {
    format!("{}:{}", file, group)
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    instances: DashMap<String, Arc<Vec<Instance>>>,
    configs: DashMap<String, Arc<ConfigFile>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_instances(&self, service: &str, instances: Vec<Instance>) {
        self.instances
            .insert(service.to_string(), Arc::new(instances));
    }

    pub fn instances(&self, service: &str) -> Option<Arc<Vec<Instance>>> {
        self.instances.get(service).map(|e| Arc::clone(e.value()))
    }

    pub fn put_config(&self, config: ConfigFile) {
        self.configs
            .insert(config_slot(&config.file, &config.group), Arc::new(config));
    }

    pub fn config(&self, file: &str, group: &str) -> Option<Arc<ConfigFile>> {
        self.configs
            .get(&config_slot(file, group))
            .map(|e| Arc::clone(e.value()))
    }

    /// All cached service names, for the health pass.
    pub fn cached_services(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }

    pub fn clear(&self) -> (usize, usize) {
        let counts = (self.instances.len(), self.configs.len());
        self.instances.clear();
        self.configs.clear();
        counts
    }
}
