use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use labnote_core::models::{
    ChangelogEntry, EntityExport, EntityReference, EntityType, Requester, Step, Upload,
};
use labnote_core::AppError;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;

use crate::db::traits::EntityRepository;

/// Visibility predicate shared by every entity query. Binds `$2` (user id) and `$3` (team id).
const READABLE: &str = "e.state <> 3 AND (e.userid = $2 OR e.canread IN ('public', 'organization') OR (e.canread = 'team' AND e.team = $3))";

#[derive(sqlx::FromRow)]
struct EntityRow {
    id: i64,
    entity_type: String,
    elabid: String,
    title: String,
    date: NaiveDate,
    body: Option<String>,
    category: Option<String>,
    status: Option<String>,
    rating: i16,
    userid: i64,
    fullname: String,
    team: i64,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    metadata: Option<serde_json::Value>,
}

#[derive(sqlx::FromRow)]
struct TagRow {
    entity_id: i64,
    tag: String,
}

#[derive(sqlx::FromRow)]
struct StepRow {
    id: i64,
    entity_id: i64,
    body: String,
    finished: bool,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct UploadRow {
    id: i64,
    entity_id: i64,
    real_name: String,
    long_name: String,
    filesize: i64,
    hash: Option<String>,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ChangelogRow {
    entity_id: i64,
    created_at: DateTime<Utc>,
    fullname: String,
    target: String,
    content: String,
}

impl EntityRow {
    fn into_export(self) -> Result<EntityExport, AppError> {
        let entity_type = self
            .entity_type
            .parse::<EntityType>()
            .map_err(AppError::Internal)?;
        Ok(EntityExport {
            id: self.id,
            entity_type,
            elabid: self.elabid,
            title: self.title,
            date: self.date,
            body: self.body,
            category: self.category,
            status: self.status,
            rating: self.rating,
            userid: self.userid,
            fullname: self.fullname,
            team: self.team,
            created_at: self.created_at,
            modified_at: self.modified_at,
            metadata: self.metadata,
            tags: Vec::new(),
            steps: Vec::new(),
            uploads: Vec::new(),
            changelog: Vec::new(),
        })
    }
}

/// PostgreSQL-backed entity repository
#[derive(Clone)]
pub struct PgEntityRepository {
    pool: PgPool,
}

impl PgEntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_rows(
        &self,
        requester: &Requester,
        ids: &[i64],
    ) -> Result<Vec<EntityRow>, AppError> {
        let sql = format!(
            r#"
            SELECT e.id, e.entity_type, e.elabid, e.title, e.date, e.body,
                   c.title AS category, s.title AS status, e.rating, e.userid,
                   CONCAT(u.firstname, ' ', u.lastname) AS fullname, e.team,
                   e.created_at, e.modified_at, e.metadata
            FROM entities e
            JOIN users u ON u.id = e.userid
            LEFT JOIN categories c ON c.id = e.category
            LEFT JOIN status s ON s.id = e.status
            WHERE e.id = ANY($1) AND {}
            "#,
            READABLE
        );
        let rows = sqlx::query_as::<Postgres, EntityRow>(&sql)
            .bind(ids)
            .bind(requester.user_id)
            .bind(requester.team_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn attach_children(&self, exports: &mut [EntityExport]) -> Result<(), AppError> {
        let ids: Vec<i64> = exports.iter().map(|e| e.id).collect();
        let mut index: HashMap<i64, Vec<usize>> = HashMap::new();
        for (i, export) in exports.iter().enumerate() {
            index.entry(export.id).or_default().push(i);
        }
        let slots = |id: i64| index.get(&id).cloned().unwrap_or_default();

        let tags = sqlx::query_as::<Postgres, TagRow>(
            "SELECT entity_id, tag FROM entity_tags WHERE entity_id = ANY($1) ORDER BY tag ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for row in tags {
            for i in slots(row.entity_id) {
                exports[i].tags.push(row.tag.clone());
            }
        }

        let steps = sqlx::query_as::<Postgres, StepRow>(
            "SELECT id, entity_id, body, finished, finished_at FROM entity_steps WHERE entity_id = ANY($1) ORDER BY ordering ASC, id ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for row in steps {
            for i in slots(row.entity_id) {
                exports[i].steps.push(Step {
                    id: row.id,
                    body: row.body.clone(),
                    finished: row.finished,
                    finished_at: row.finished_at,
                });
            }
        }

        let uploads = sqlx::query_as::<Postgres, UploadRow>(
            r#"
            SELECT id, entity_id, real_name, long_name, filesize, hash, comment, created_at
            FROM uploads
            WHERE entity_id = ANY($1) AND state <> 3
            ORDER BY id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for row in uploads {
            for i in slots(row.entity_id) {
                exports[i].uploads.push(Upload {
                    id: row.id,
                    real_name: row.real_name.clone(),
                    storage_key: row.long_name.clone(),
                    filesize: row.filesize,
                    hash: row.hash.clone(),
                    comment: row.comment.clone(),
                    created_at: row.created_at,
                });
            }
        }

        let changelog = sqlx::query_as::<Postgres, ChangelogRow>(
            r#"
            SELECT ch.entity_id, ch.created_at, CONCAT(u.firstname, ' ', u.lastname) AS fullname,
                   ch.target, ch.content
            FROM changelog ch
            JOIN users u ON u.id = ch.users_id
            WHERE ch.entity_id = ANY($1)
            ORDER BY ch.created_at ASC, ch.id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for row in changelog {
            for i in slots(row.entity_id) {
                exports[i].changelog.push(ChangelogEntry {
                    created_at: row.created_at,
                    fullname: row.fullname.clone(),
                    target: row.target.clone(),
                    content: row.content.clone(),
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EntityRepository for PgEntityRepository {
    #[tracing::instrument(skip(self, requester), fields(db.table = "entities", db.operation = "select", user_id = requester.user_id))]
    async fn list_ids_by_category(
        &self,
        requester: &Requester,
        entity_type: EntityType,
        category_id: i64,
    ) -> Result<Vec<i64>, AppError> {
        let sql = format!(
            "SELECT e.id FROM entities e WHERE e.category = $1 AND {} AND e.entity_type = $4 ORDER BY e.id ASC",
            READABLE
        );
        let ids = sqlx::query_scalar::<Postgres, i64>(&sql)
            .bind(category_id)
            .bind(requester.user_id)
            .bind(requester.team_id)
            .bind(entity_type.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    #[tracing::instrument(skip(self, requester), fields(db.table = "entities", db.operation = "select", user_id = requester.user_id))]
    async fn list_ids_by_owner(
        &self,
        requester: &Requester,
        entity_type: EntityType,
        owner_id: i64,
    ) -> Result<Vec<i64>, AppError> {
        let sql = format!(
            "SELECT e.id FROM entities e WHERE e.userid = $1 AND {} AND e.entity_type = $4 ORDER BY e.id ASC",
            READABLE
        );
        let ids = sqlx::query_scalar::<Postgres, i64>(&sql)
            .bind(owner_id)
            .bind(requester.user_id)
            .bind(requester.team_id)
            .bind(entity_type.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    #[tracing::instrument(skip(self, requester, references), fields(db.table = "entities", db.operation = "select", count = references.len()))]
    async fn load_for_export(
        &self,
        requester: &Requester,
        references: &[EntityReference],
    ) -> Result<Vec<EntityExport>, AppError> {
        if references.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = references.iter().map(|r| r.id).collect();
        let mut found: HashMap<EntityReference, EntityExport> = HashMap::new();
        for row in self.load_rows(requester, &ids).await? {
            let export = row.into_export()?;
            found.insert(export.reference(), export);
        }

        // Reference order wins; repeated references render repeatedly
        let mut exports: Vec<EntityExport> = references
            .iter()
            .filter_map(|reference| {
                let export = found.get(reference).cloned();
                if export.is_none() {
                    tracing::warn!(reference = %reference, "Entity not found or not readable, skipping");
                }
                export
            })
            .collect();

        self.attach_children(&mut exports).await?;
        Ok(exports)
    }
}
