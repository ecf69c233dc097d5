//! Audit and alert sinks.
//!
//! Both are write-only interfaces. The defaults route through tracing so the
//! plane works without external wiring; hosts swap in real sinks via the
//! plane builder.

use std::time::SystemTime;

use tracing::{error, info};

/// One audit entry on the change/error delivery path.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub action: &'static str,
    pub key: String,
    pub outcome: &'static str,
    pub detail: String,
    pub at: SystemTime,
}

impl AuditRecord {
    pub fn new(action: &'static str, key: impl ToString, outcome: &'static str, detail: impl ToString) -> Self {
        Self {
            action,
            key: key.to_string(),
            outcome,
            detail: detail.to_string(),
            at: SystemTime::now(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

pub trait AlertSink: Send + Sync {
    fn alert(&self, key: &str, message: &str);
}

/// Default audit sink: structured log lines under the `planeguard::audit`
/// target.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            target: "planeguard::audit",
            action = record.action,
            key = %record.key,
            outcome = record.outcome,
            detail = %record.detail,
            "audit"
        );
    }
}

/// Default alert sink: error-level log lines.
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, key: &str, message: &str) {
        error!(target: "planeguard::alert", key = %key, message = %message, "alert");
    }
}
