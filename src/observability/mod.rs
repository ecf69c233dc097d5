//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters keyed by operation/outcome + snapshot)
//!     → audit.rs (audit records and alerts, write-only sinks)
//! ```
//!
//! # Design Decisions
//! - Sinks are write-only trait objects; the defaults route through tracing
//! - Metric updates are atomic increments, cheap on the event path
//! - Token and credential material never reaches any sink

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::{AlertSink, AuditRecord, AuditSink, TracingAlertSink, TracingAuditSink};
pub use metrics::{MetricsSnapshot, PlaneMetrics};
