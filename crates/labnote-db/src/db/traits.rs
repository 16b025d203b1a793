//! Collaborator contracts consumed by the export pipeline

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use labnote_core::models::{
    AuditExportEvent, Booking, EntityExport, EntityReference, EntityType, ProcurementRequest,
    Requester, UserUsage,
};
use labnote_core::AppError;
use sqlx::PgPool;
use std::sync::Arc;

use super::memory::MemoryStore;
use super::postgres::{
    PgAuditLogRepository, PgEntityRepository, PgProcurementRequestRepository,
    PgSchedulerRepository, PgTeamRepository, PgUserRepository,
};

/// Entity data access for one notebook
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Ids of the readable entities of `entity_type` in a category, in repository order
    async fn list_ids_by_category(
        &self,
        requester: &Requester,
        entity_type: EntityType,
        category_id: i64,
    ) -> Result<Vec<i64>, AppError>;

    /// Ids of the entities of `entity_type` owned by `owner_id`, in repository order
    async fn list_ids_by_owner(
        &self,
        requester: &Requester,
        entity_type: EntityType,
        owner_id: i64,
    ) -> Result<Vec<i64>, AppError>;

    /// Full records for the given references, in reference order.
    ///
    /// References that do not exist or that the requester cannot read are left out.
    async fn load_for_export(
        &self,
        requester: &Requester,
        references: &[EntityReference],
    ) -> Result<Vec<EntityExport>, AppError>;
}

/// Team membership checks and instance statistics
#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Whether `admin_id` is an admin of a team `target_id` belongs to
    async fn is_admin_of(&self, admin_id: i64, target_id: i64) -> Result<bool, AppError>;

    /// Whether `target_id` is a member of `team_id`
    async fn has_common_team(&self, target_id: i64, team_id: i64) -> Result<bool, AppError>;

    /// One usage row per user of the instance
    async fn usage_report(&self) -> Result<Vec<UserUsage>, AppError>;
}

#[async_trait]
pub trait SchedulerRepository: Send + Sync {
    /// Bookings of the team overlapping `[start, end]`, restricted to `item_ids` when given
    async fn bookings(
        &self,
        team_id: i64,
        item_ids: Option<&[i64]>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<Booking>, AppError>;
}

#[async_trait]
pub trait ProcurementRequestRepository: Send + Sync {
    async fn list_for_team(&self, team_id: i64) -> Result<Vec<ProcurementRequest>, AppError>;
}

/// Destination of audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditExportEvent) -> Result<(), AppError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Resolve the acting user from the SHA-256 hex digest of an API key
    async fn find_by_api_key_hash(&self, key_hash: &str) -> Result<Option<Requester>, AppError>;
}

/// One backend's repositories behind trait objects
#[derive(Clone)]
pub struct Repositories {
    pub entities: Arc<dyn EntityRepository>,
    pub teams: Arc<dyn TeamRepository>,
    pub scheduler: Arc<dyn SchedulerRepository>,
    pub procurement_requests: Arc<dyn ProcurementRequestRepository>,
    pub audit: Arc<dyn AuditSink>,
    pub users: Arc<dyn UserRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            entities: Arc::new(PgEntityRepository::new(pool.clone())),
            teams: Arc::new(PgTeamRepository::new(pool.clone())),
            scheduler: Arc::new(PgSchedulerRepository::new(pool.clone())),
            procurement_requests: Arc::new(PgProcurementRequestRepository::new(pool.clone())),
            audit: Arc::new(PgAuditLogRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool)),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            entities: store.clone(),
            teams: store.clone(),
            scheduler: store.clone(),
            procurement_requests: store.clone(),
            audit: store.clone(),
            users: store,
        }
    }
}
