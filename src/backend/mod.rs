//! Control-plane backend abstraction.
//!
//! # Responsibilities
//! - Define the opaque capability the plane consumes: instance/config queries,
//!   rate-limit checks, and a subscribe primitive emitting change/error events
//! - Define the wire-independent data types (`Instance`, `ConfigFile`)
//!
//! # Design Decisions
//! - The backend is an injected trait object; the actual wire protocol lives
//!   outside this crate
//! - A subscription is a bounded channel of events, open until dropped; a slow
//!   consumer backpressures the producer for that key

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::watch::WatchKey;

/// Default event-channel depth per subscription.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// A single service instance as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub weight: u32,
    pub healthy: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A configuration file snapshot as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub file: String,
    pub group: String,
    pub content: String,
}

/// Errors produced by the backend capability.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("subscription stream closed")]
    StreamClosed,

    #[error("backend error: {0}")]
    Other(String),
}

/// Payload of a change event, one variant per resource family.
#[derive(Debug, Clone)]
pub enum ChangePayload {
    Instances(Vec<Instance>),
    Config(ConfigFile),
}

/// Event emitted by a backend subscription.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Change(ChangePayload),
    Error(BackendError),
}

/// Receiving half of a backend change stream for one key.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<WatchEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` means the stream ended.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }
}

/// Create a subscription and the sender a backend uses to feed it.
pub fn subscription_channel(buffer: usize) -> (mpsc::Sender<WatchEvent>, Subscription) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, Subscription { events: rx })
}

/// The capability exposed by the remote control plane.
///
/// Implementations wrap the actual discovery/config/rate-limit protocol;
/// this crate only assumes the semantics below.
#[async_trait]
pub trait ControlPlaneBackend: Send + Sync {
    /// Look up the current instance list for a service.
    async fn query_instances(&self, service: &str) -> Result<Vec<Instance>, BackendError>;

    /// Fetch a configuration file by name and group.
    async fn query_config(&self, file: &str, group: &str) -> Result<ConfigFile, BackendError>;

    /// Ask the backend whether a request under these labels is admitted.
    async fn check_rate_limit(
        &self,
        service: &str,
        labels: &HashMap<String, String>,
    ) -> Result<bool, BackendError>;

    /// Open a change stream for the given key.
    async fn subscribe(&self, key: &WatchKey) -> Result<Subscription, BackendError>;

    /// Tear down backend connections. May block; the shutdown orchestrator
    /// bounds this call with a timeout.
    async fn close(&self) -> Result<(), BackendError>;
}
