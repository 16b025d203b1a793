use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use labnote_core::models::Booking;
use labnote_core::AppError;
use sqlx::{PgPool, Postgres};

use crate::db::traits::SchedulerRepository;

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    item_id: i64,
    item_title: String,
    title: Option<String>,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    userid: i64,
    fullname: String,
    team: i64,
    experiment: Option<i64>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            item_id: row.item_id,
            item_title: row.item_title,
            title: row.title,
            start: row.start_at,
            end: row.end_at,
            userid: row.userid,
            fullname: row.fullname,
            team: row.team,
            experiment_id: row.experiment,
        }
    }
}

#[derive(Clone)]
pub struct PgSchedulerRepository {
    pool: PgPool,
}

impl PgSchedulerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchedulerRepository for PgSchedulerRepository {
    #[tracing::instrument(skip(self, item_ids), fields(db.table = "scheduler_events", db.operation = "select"))]
    async fn bookings(
        &self,
        team_id: i64,
        item_ids: Option<&[i64]>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<Booking>, AppError> {
        let rows = sqlx::query_as::<Postgres, BookingRow>(
            r#"
            SELECT ev.id, ev.item AS item_id, i.title AS item_title, ev.title,
                   ev.start_at, ev.end_at, ev.userid,
                   CONCAT(u.firstname, ' ', u.lastname) AS fullname, ev.team, ev.experiment
            FROM scheduler_events ev
            JOIN entities i ON i.id = ev.item
            JOIN users u ON u.id = ev.userid
            WHERE ev.team = $1
              AND ev.start_at < $3 AND ev.end_at > $2
              AND ($4::BIGINT[] IS NULL OR ev.item = ANY($4))
            ORDER BY ev.start_at ASC, ev.id ASC
            "#,
        )
        .bind(team_id)
        .bind(start.with_timezone(&Utc))
        .bind(end.with_timezone(&Utc))
        .bind(item_ids.map(|ids| ids.to_vec()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Booking::from).collect())
    }
}
