//! Constants shared across the export pipeline

/// Exports above this many entries are written to the audit log
pub const AUDIT_THRESHOLD: usize = 12;

/// Scheduler report range used when the request does not give one
pub const DEFAULT_REPORT_START: &str = "2018-12-23T00:00:00+01:00";
pub const DEFAULT_REPORT_END: &str = "2119-12-23T00:00:00+01:00";

/// Attachment filename used when the real name is not ASCII-safe
pub const FALLBACK_ARCHIVE_NAME: &str = "elabftw-export.zip";

/// Request path whose CSV export lists procurement requests instead of entities
pub const PROCUREMENT_REQUESTS_PATH: &str = "/api/v2/teams/current/procurement_requests";
