use async_trait::async_trait;
use labnote_core::models::{PdfPageFormat, Requester};
use labnote_core::AppError;
use sqlx::{PgPool, Postgres};

use crate::db::traits::UserRepository;

#[derive(sqlx::FromRow)]
struct RequesterRow {
    user_id: i64,
    team_id: i64,
    fullname: String,
    is_sysadmin: bool,
    pdf_format: String,
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[tracing::instrument(skip(self, key_hash), fields(db.table = "api_keys", db.operation = "select"))]
    async fn find_by_api_key_hash(&self, key_hash: &str) -> Result<Option<Requester>, AppError> {
        let row = sqlx::query_as::<Postgres, RequesterRow>(
            r#"
            SELECT u.id AS user_id, k.team AS team_id,
                   CONCAT(u.firstname, ' ', u.lastname) AS fullname,
                   u.is_sysadmin, u.pdf_format
            FROM api_keys k
            JOIN users u ON u.id = k.userid
            WHERE k.key_hash = $1 AND NOT u.archived AND u.validated
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Requester {
            user_id: row.user_id,
            team_id: row.team_id,
            fullname: row.fullname,
            is_sysadmin: row.is_sysadmin,
            pdf_format: row.pdf_format.parse().unwrap_or(PdfPageFormat::A4),
        }))
    }
}
