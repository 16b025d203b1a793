use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user usage row of the instance report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUsage {
    pub userid: i64,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub teams: Vec<String>,
    pub is_sysadmin: bool,
    pub validated: bool,
    pub archived: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub experiments_count: i64,
    pub timestamped_count: i64,
    pub items_count: i64,
    pub uploads_count: i64,
    pub disk_usage_bytes: i64,
}
