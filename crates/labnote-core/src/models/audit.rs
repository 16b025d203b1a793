use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// High-volume export marker written to the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditExportEvent {
    pub actor_id: i64,
    pub entity_count: usize,
    pub created_at: DateTime<Utc>,
}

impl AuditExportEvent {
    pub fn new(actor_id: i64, entity_count: usize) -> Self {
        Self {
            actor_id,
            entity_count,
            created_at: Utc::now(),
        }
    }

    pub fn body(&self) -> String {
        format!("User exported {} entries", self.entity_count)
    }
}
