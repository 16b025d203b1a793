use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labnote_core::models::{ProcurementRequest, ProcurementState};
use labnote_core::AppError;
use sqlx::{PgPool, Postgres};

use crate::db::traits::ProcurementRequestRepository;

#[derive(sqlx::FromRow)]
struct ProcurementRow {
    id: i64,
    team: i64,
    created_at: DateTime<Utc>,
    requester_fullname: String,
    entity_id: i64,
    entity_title: String,
    qty_ordered: i32,
    qty_received: i32,
    body: Option<String>,
    state: i16,
}

#[derive(Clone)]
pub struct PgProcurementRequestRepository {
    pool: PgPool,
}

impl PgProcurementRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcurementRequestRepository for PgProcurementRequestRepository {
    #[tracing::instrument(skip(self), fields(db.table = "procurement_requests", db.operation = "select"))]
    async fn list_for_team(&self, team_id: i64) -> Result<Vec<ProcurementRequest>, AppError> {
        let rows = sqlx::query_as::<Postgres, ProcurementRow>(
            r#"
            SELECT pr.id, pr.team, pr.created_at,
                   CONCAT(u.firstname, ' ', u.lastname) AS requester_fullname,
                   pr.entity_id, e.title AS entity_title, pr.qty_ordered, pr.qty_received,
                   pr.body, pr.state
            FROM procurement_requests pr
            JOIN users u ON u.id = pr.requester_userid
            JOIN entities e ON e.id = pr.entity_id
            WHERE pr.team = $1
            ORDER BY pr.created_at DESC, pr.id DESC
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ProcurementRequest {
                id: row.id,
                team: row.team,
                created_at: row.created_at,
                requester_fullname: row.requester_fullname,
                entity_id: row.entity_id,
                entity_title: row.entity_title,
                quantity: row.qty_ordered,
                quantity_received: row.qty_received,
                body: row.body,
                state: ProcurementState::from_code(row.state),
            })
            .collect())
    }
}
