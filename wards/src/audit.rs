use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::model::{AuditEntry, AuditEventType, RecordId};
use crate::store::{bounded, AuditSink};

/// Best-effort writer for the audit trail.
///
/// A failed or timed-out append is reported through tracing and metrics and
/// otherwise ignored: the audit trail observes decisions, it never gates them.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Append one entry stamped now; returns whether the sink accepted it.
    pub async fn log_event(
        &self,
        event_type: AuditEventType,
        message: impl Into<String>,
        user_id: Option<RecordId>,
    ) -> bool {
        self.log_event_at(event_type, message, user_id, Utc::now())
            .await
    }

    /// Like [`AuditLogger::log_event`], for an event that happened at `at`.
    pub async fn log_event_at(
        &self,
        event_type: AuditEventType,
        message: impl Into<String>,
        user_id: Option<RecordId>,
        at: DateTime<Utc>,
    ) -> bool {
        let entry = AuditEntry::at(event_type, message, user_id, at);
        let entry_id = entry.id;
        let event_type = entry.event_type.clone();

        match bounded("audit.append", self.timeout, self.sink.append(entry)).await {
            Ok(()) => {
                debug!(
                    event = "audit.appended",
                    audit_id = %entry_id,
                    event_type = %event_type,
                    "Audit entry written"
                );
                true
            }
            Err(e) => {
                error!(
                    event = "audit.write_failed",
                    audit_id = %entry_id,
                    event_type = %event_type,
                    error = %e,
                    "Failed to write audit entry"
                );
                counter!("doorward_audit_write_failures_total", 1,
                    "event_type" => event_type.as_str().to_string()
                );
                false
            }
        }
    }
}
