//! High-volume export auditing
//!
//! Exports above [`AUDIT_THRESHOLD`] entries leave one event in the audit log. The event
//! is recorded in its own task: a failing audit sink is logged and never affects the
//! export itself.

use labnote_core::constants::AUDIT_THRESHOLD;
use labnote_core::models::AuditExportEvent;
use labnote_db::AuditSink;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct ExportAuditor {
    sink: Arc<dyn AuditSink>,
    threshold: usize,
}

impl ExportAuditor {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            threshold: AUDIT_THRESHOLD,
        }
    }

    /// Record an export event when `count` exceeds the threshold.
    ///
    /// Returns the handle of the recording task, or `None` when nothing is recorded.
    pub fn record_if_needed(&self, actor_id: i64, count: usize) -> Option<JoinHandle<()>> {
        if count <= self.threshold {
            return None;
        }
        let sink = self.sink.clone();
        let event = AuditExportEvent::new(actor_id, count);
        Some(tokio::spawn(async move {
            if let Err(e) = sink.record(&event).await {
                tracing::warn!(
                    error = %e,
                    actor_id = event.actor_id,
                    entity_count = event.entity_count,
                    "Failed to record export audit event"
                );
            }
        }))
    }
}
