use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reservation of a bookable item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub item_id: i64,
    pub item_title: String,
    pub title: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub userid: i64,
    pub fullname: String,
    pub team: i64,
    pub experiment_id: Option<i64>,
}

impl Booking {
    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_minutes() as f64 / 60.0
    }
}
