//! planeguard — resilience and change-propagation layer for a
//! service-governance control plane.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌───────────────────────────────────────────────┐
//!                 │               GOVERNANCE PLANE                 │
//!   application   │                                               │
//!   ─ watch ──────┼─▶ watch (registry, service/config watchers)   │
//!   ─ query ──────┼─▶ resilience (retry, circuit breaker) ────────┼──▶ backend
//!                 │         │                │                    │    (trait)
//!                 │         ▼                ▼                    │
//!                 │      cache          degrade                   │
//!                 │                                               │
//!                 │  cross-cutting: config, health, lifecycle,    │
//!                 │                 observability                 │
//!                 └───────────────────────────────────────────────┘
//! ```
//!
//! A consumer watches a key; the registry hands out the single active watcher
//! for it. Change events update the cache and fan out to sinks and dependents
//! in order; persistent errors degrade the key to cached reads while exactly
//! one background loop per key re-establishes the subscription. Synchronous
//! queries are wrapped by the circuit breaker, and shutdown tears everything
//! down under a bounded deadline.

// Core subsystems
pub mod backend;
pub mod plane;
pub mod watch;

// Resilience & state
pub mod cache;
pub mod degrade;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use backend::{ConfigFile, ControlPlaneBackend, Instance};
pub use config::PlaneConfig;
pub use error::PlaneError;
pub use plane::GovernancePlane;
pub use watch::WatchKey;
