use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labnote_core::models::UserUsage;
use labnote_core::AppError;
use sqlx::{PgPool, Postgres};

use crate::db::traits::TeamRepository;

#[derive(sqlx::FromRow)]
struct UsageRow {
    userid: i64,
    firstname: String,
    lastname: String,
    email: String,
    teams: Option<Vec<String>>,
    is_sysadmin: bool,
    validated: bool,
    archived: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    experiments_count: i64,
    timestamped_count: i64,
    items_count: i64,
    uploads_count: i64,
    disk_usage_bytes: i64,
}

#[derive(Clone)]
pub struct PgTeamRepository {
    pool: PgPool,
}

impl PgTeamRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamRepository for PgTeamRepository {
    #[tracing::instrument(skip(self), fields(db.table = "users2teams", db.operation = "select"))]
    async fn is_admin_of(&self, admin_id: i64, target_id: i64) -> Result<bool, AppError> {
        let is_admin = sqlx::query_scalar::<Postgres, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM users2teams admin
                JOIN users2teams target ON target.teams_id = admin.teams_id
                WHERE admin.users_id = $1 AND admin.is_admin AND target.users_id = $2
            )
            "#,
        )
        .bind(admin_id)
        .bind(target_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(is_admin)
    }

    #[tracing::instrument(skip(self), fields(db.table = "users2teams", db.operation = "select"))]
    async fn has_common_team(&self, target_id: i64, team_id: i64) -> Result<bool, AppError> {
        let member = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM users2teams WHERE users_id = $1 AND teams_id = $2)",
        )
        .bind(target_id)
        .bind(team_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(member)
    }

    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "select"))]
    async fn usage_report(&self) -> Result<Vec<UserUsage>, AppError> {
        let rows = sqlx::query_as::<Postgres, UsageRow>(
            r#"
            SELECT u.id AS userid, u.firstname, u.lastname, u.email,
                   (SELECT ARRAY_AGG(t.name ORDER BY t.name)
                      FROM users2teams ut JOIN teams t ON t.id = ut.teams_id
                     WHERE ut.users_id = u.id) AS teams,
                   u.is_sysadmin, u.validated, u.archived, u.last_login, u.created_at,
                   (SELECT COUNT(*) FROM entities e
                     WHERE e.userid = u.id AND e.entity_type = 'experiments' AND e.state <> 3) AS experiments_count,
                   (SELECT COUNT(*) FROM entities e
                     WHERE e.userid = u.id AND e.entity_type = 'experiments' AND e.state <> 3 AND e.timestamped) AS timestamped_count,
                   (SELECT COUNT(*) FROM entities e
                     WHERE e.userid = u.id AND e.entity_type = 'items' AND e.state <> 3) AS items_count,
                   (SELECT COUNT(*) FROM uploads up
                     WHERE up.userid = u.id AND up.state <> 3) AS uploads_count,
                   (SELECT COALESCE(SUM(up.filesize), 0)::BIGINT FROM uploads up
                     WHERE up.userid = u.id AND up.state <> 3) AS disk_usage_bytes
            FROM users u
            ORDER BY u.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserUsage {
                userid: row.userid,
                firstname: row.firstname,
                lastname: row.lastname,
                email: row.email,
                teams: row.teams.unwrap_or_default(),
                is_sysadmin: row.is_sysadmin,
                validated: row.validated,
                archived: row.archived,
                last_login: row.last_login,
                created_at: row.created_at,
                experiments_count: row.experiments_count,
                timestamped_count: row.timestamped_count,
                items_count: row.items_count,
                uploads_count: row.uploads_count,
                disk_usage_bytes: row.disk_usage_bytes,
            })
            .collect())
    }
}
