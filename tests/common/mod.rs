//! Shared utilities for integration testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use planeguard::backend::{
    subscription_channel, BackendError, ChangePayload, ConfigFile, ControlPlaneBackend, Instance,
    Subscription, WatchEvent,
};
use planeguard::watch::WatchKey;

/// A programmable control-plane backend with invocation counters and
/// injectable event streams, one sender per subscribed key.
#[derive(Default)]
pub struct MockBackend {
    pub subscribe_calls: AtomicU32,
    pub query_calls: AtomicU32,
    pub close_calls: AtomicU32,
    pub fail_queries: AtomicBool,
    pub fail_subscribe: AtomicBool,
    pub hang_close: AtomicBool,
    pub rate_limit_allow: AtomicBool,
    instances: Mutex<Vec<Instance>>,
    config_content: Mutex<String>,
    senders: Mutex<HashMap<WatchKey, mpsc::Sender<WatchEvent>>>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.rate_limit_allow.store(true, Ordering::SeqCst);
        *backend.config_content.lock().unwrap() = "mock-content".to_string();
        backend
    }

    pub fn set_instances(&self, instances: Vec<Instance>) {
        *self.instances.lock().unwrap() = instances;
    }

    pub fn set_config_content(&self, content: &str) {
        *self.config_content.lock().unwrap() = content.to_string();
    }

    fn sender_for(&self, key: &WatchKey) -> Option<mpsc::Sender<WatchEvent>> {
        self.senders.lock().unwrap().get(key).cloned()
    }

    /// Push a change event into the active subscription for `key`.
    pub async fn inject_change(&self, key: &WatchKey, payload: ChangePayload) {
        let sender = self.sender_for(key).expect("no active subscription");
        sender
            .send(WatchEvent::Change(payload))
            .await
            .expect("subscription receiver dropped");
    }

    /// Push an error event into the active subscription for `key`.
    pub async fn inject_error(&self, key: &WatchKey, message: &str) {
        let sender = self.sender_for(key).expect("no active subscription");
        sender
            .send(WatchEvent::Error(BackendError::Unavailable(
                message.to_string(),
            )))
            .await
            .expect("subscription receiver dropped");
    }
}

#[async_trait]
impl ControlPlaneBackend for MockBackend {
    async fn query_instances(&self, _service: &str) -> Result<Vec<Instance>, BackendError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("injected failure".to_string()));
        }
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn query_config(&self, file: &str, group: &str) -> Result<ConfigFile, BackendError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("injected failure".to_string()));
        }
        Ok(ConfigFile {
            file: file.to_string(),
            group: group.to_string(),
            content: self.config_content.lock().unwrap().clone(),
        })
    }

    async fn check_rate_limit(
        &self,
        _service: &str,
        _labels: &HashMap<String, String>,
    ) -> Result<bool, BackendError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("injected failure".to_string()));
        }
        Ok(self.rate_limit_allow.load(Ordering::SeqCst))
    }

    async fn subscribe(&self, key: &WatchKey) -> Result<Subscription, BackendError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(
                "injected subscribe failure".to_string(),
            ));
        }
        let (tx, subscription) = subscription_channel(16);
        self.senders.lock().unwrap().insert(key.clone(), tx);
        Ok(subscription)
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// An instance fixture.
#[allow(dead_code)]
pub fn instance(id: &str, healthy: bool) -> Instance {
    Instance {
        id: id.to_string(),
        host: "127.0.0.1".to_string(),
        port: 9000,
        weight: 100,
        healthy,
        metadata: HashMap::new(),
    }
}

/// A config suitable for fast tests: short retry delays, 1s shutdown bound.
#[allow(dead_code)]
pub fn test_config() -> planeguard::PlaneConfig {
    planeguard::PlaneConfig {
        namespace: "test-namespace".to_string(),
        max_retry_times: 2,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 20,
        shutdown_timeout_secs: Some(1),
        ..planeguard::PlaneConfig::default()
    }
}
