//! Metrics collection.
//!
//! Two layers: counters published through the `metrics` facade for whatever
//! exporter the host process installs, and an in-process [`PlaneMetrics`]
//! aggregate behind `get_metrics()`.
//!
//! # Metrics
//! - `plane_operations_total` (counter): by operation, outcome
//! - `plane_watch_events_total` (counter): by family
//! - `plane_watch_errors_total` (counter): by family
//! - `plane_degradations_total` (counter): by key
//! - `plane_breaker_transitions_total` (counter): by target state

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// In-process counters, shared across all plane components.
#[derive(Debug, Default)]
pub struct PlaneMetrics {
    operations: AtomicU64,
    operation_failures: AtomicU64,
    watch_events: AtomicU64,
    watch_errors: AtomicU64,
    degradations: AtomicU64,
    retry_loops: AtomicU64,
}

impl PlaneMetrics {
    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        if outcome != "success" {
            self.operation_failures.fetch_add(1, Ordering::Relaxed);
        }
        metrics::counter!(
            "plane_operations_total",
            "operation" => operation.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }

    pub fn record_watch_event(&self, family: &'static str) {
        self.watch_events.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("plane_watch_events_total", "family" => family).increment(1);
    }

    pub fn record_watch_error(&self, family: &'static str) {
        self.watch_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("plane_watch_errors_total", "family" => family).increment(1);
    }

    pub fn record_degradation(&self) {
        self.degradations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_loop(&self) {
        self.retry_loops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations: self.operations.load(Ordering::Relaxed),
            operation_failures: self.operation_failures.load(Ordering::Relaxed),
            watch_events: self.watch_events.load(Ordering::Relaxed),
            watch_errors: self.watch_errors.load(Ordering::Relaxed),
            degradations: self.degradations.load(Ordering::Relaxed),
            retry_loops: self.retry_loops.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the plane's counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub operations: u64,
    pub operation_failures: u64,
    pub watch_events: u64,
    pub watch_errors: u64,
    pub degradations: u64,
    pub retry_loops: u64,
}
