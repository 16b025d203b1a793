use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use labnote_core::AppError;

use super::csv::write_csv;
use super::{BufferedMaker, ExportContext, CONTENT_TYPE_CSV};

const HEADER: [&str; 15] = [
    "userid",
    "firstname",
    "lastname",
    "email",
    "teams",
    "is_sysadmin",
    "validated",
    "archived",
    "last_login",
    "created_at",
    "experiments",
    "timestamped_experiments",
    "items",
    "uploads",
    "disk_usage_bytes",
];

/// Instance usage report, one row per user. Sysadmin only; checked by the dispatcher.
pub struct SysadminReportMaker {
    context: ExportContext,
}

impl SysadminReportMaker {
    pub fn new(context: ExportContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl BufferedMaker for SysadminReportMaker {
    fn name(&self) -> &'static str {
        "sysadmin_report"
    }

    async fn file_content(&self) -> Result<Bytes, AppError> {
        let usage = self.context.repositories.teams.usage_report().await?;
        let rows = usage.into_iter().map(|user| {
            vec![
                user.userid.to_string(),
                user.firstname,
                user.lastname,
                user.email,
                user.teams.join(", "),
                user.is_sysadmin.to_string(),
                user.validated.to_string(),
                user.archived.to_string(),
                user.last_login.map(|d| d.to_rfc3339()).unwrap_or_default(),
                user.created_at.to_rfc3339(),
                user.experiments_count.to_string(),
                user.timestamped_count.to_string(),
                user.items_count.to_string(),
                user.uploads_count.to_string(),
                user.disk_usage_bytes.to_string(),
            ]
        });
        write_csv(&HEADER, rows)
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_CSV
    }

    fn file_name(&self) -> String {
        format!("{}-report.elabftw.csv", Utc::now().format("%Y-%m-%d"))
    }
}
