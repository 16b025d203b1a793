use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcurementState {
    Pending,
    Approved,
    Ordered,
    Received,
    Cancelled,
}

impl ProcurementState {
    pub fn from_code(code: i16) -> Self {
        match code {
            20 => ProcurementState::Approved,
            30 => ProcurementState::Ordered,
            40 => ProcurementState::Received,
            50 => ProcurementState::Cancelled,
            _ => ProcurementState::Pending,
        }
    }
}

impl fmt::Display for ProcurementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcurementState::Pending => "Pending",
            ProcurementState::Approved => "Approved",
            ProcurementState::Ordered => "Ordered",
            ProcurementState::Received => "Received",
            ProcurementState::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

/// Purchase request for an item, scoped to a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcurementRequest {
    pub id: i64,
    pub team: i64,
    pub created_at: DateTime<Utc>,
    pub requester_fullname: String,
    pub entity_id: i64,
    pub entity_title: String,
    pub quantity: i32,
    pub quantity_received: i32,
    pub body: Option<String>,
    pub state: ProcurementState,
}
