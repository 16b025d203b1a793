use async_trait::async_trait;
use labnote_core::models::AuditExportEvent;
use labnote_core::AppError;
use sqlx::PgPool;

use crate::db::traits::AuditSink;

/// Audit log category for bulk exports
const CATEGORY_EXPORT: i16 = 60;

#[derive(Clone)]
pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditLogRepository {
    #[tracing::instrument(skip(self, event), fields(db.table = "audit_logs", db.operation = "insert", actor_id = event.actor_id))]
    async fn record(&self, event: &AuditExportEvent) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (requester_userid, target_userid, category, body, created_at)
            VALUES ($1, $1, $2, $3, $4)
            "#,
        )
        .bind(event.actor_id)
        .bind(CATEGORY_EXPORT)
        .bind(event.body())
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
