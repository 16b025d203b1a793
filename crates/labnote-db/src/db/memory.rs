//! In-memory backend
//!
//! Implements every repository trait over plain collections. Used by the test suites
//! and by the server when no `DATABASE_URL` is configured.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use labnote_core::models::{
    AuditExportEvent, Booking, EntityExport, EntityReference, EntityType, PdfPageFormat,
    ProcurementRequest, Requester, UserUsage,
};
use labnote_core::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::traits::{
    AuditSink, EntityRepository, ProcurementRequestRepository, SchedulerRepository,
    TeamRepository, UserRepository,
};

/// Who may read an entity besides its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    Public,
    #[default]
    Team,
    User,
}

#[derive(Debug, Clone)]
pub struct MemoryUser {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub is_sysadmin: bool,
    pub validated: bool,
    pub archived: bool,
    pub pdf_format: PdfPageFormat,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// (team id, team name, is admin)
    pub teams: Vec<(i64, String, bool)>,
}

impl MemoryUser {
    pub fn new(id: i64, firstname: &str, lastname: &str) -> Self {
        Self {
            id,
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
            email: format!("{}.{}@example.org", firstname, lastname).to_lowercase(),
            is_sysadmin: false,
            validated: true,
            archived: false,
            pdf_format: PdfPageFormat::A4,
            last_login: None,
            created_at: Utc::now(),
            teams: Vec::new(),
        }
    }

    pub fn member_of(mut self, team_id: i64, team_name: &str, is_admin: bool) -> Self {
        self.teams.push((team_id, team_name.to_string(), is_admin));
        self
    }

    pub fn sysadmin(mut self) -> Self {
        self.is_sysadmin = true;
        self
    }

    pub fn fullname(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryEntity {
    pub export: EntityExport,
    pub category_id: Option<i64>,
    pub visibility: Visibility,
    pub deleted: bool,
    pub timestamped: bool,
    pub bookable: bool,
}

impl MemoryEntity {
    pub fn new(export: EntityExport) -> Self {
        Self {
            export,
            category_id: None,
            visibility: Visibility::Team,
            deleted: false,
            timestamped: false,
            bookable: false,
        }
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    fn readable_by(&self, requester: &Requester) -> bool {
        if self.deleted {
            return false;
        }
        if self.export.userid == requester.user_id {
            return true;
        }
        match self.visibility {
            Visibility::Public => true,
            Visibility::Team => self.export.team == requester.team_id,
            Visibility::User => false,
        }
    }
}

#[derive(Default)]
struct MemoryData {
    users: Vec<MemoryUser>,
    api_keys: HashMap<String, (i64, i64)>,
    entities: Vec<MemoryEntity>,
    bookings: Vec<Booking>,
    procurement_requests: Vec<ProcurementRequest>,
    audit_events: Vec<AuditExportEvent>,
}

/// Repository backend holding everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
    entity_reads: AtomicUsize,
    fail_audit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: MemoryUser) {
        self.data.write().await.users.push(user);
    }

    /// Register an API key (by SHA-256 hex digest) acting as `user_id` in `team_id`
    pub async fn insert_api_key(&self, key_hash: &str, user_id: i64, team_id: i64) {
        self.data
            .write()
            .await
            .api_keys
            .insert(key_hash.to_string(), (user_id, team_id));
    }

    pub async fn insert_entity(&self, entity: MemoryEntity) {
        self.data.write().await.entities.push(entity);
    }

    pub async fn insert_booking(&self, booking: Booking) {
        self.data.write().await.bookings.push(booking);
    }

    pub async fn insert_procurement_request(&self, request: ProcurementRequest) {
        self.data.write().await.procurement_requests.push(request);
    }

    pub async fn audit_events(&self) -> Vec<AuditExportEvent> {
        self.data.read().await.audit_events.clone()
    }

    /// Number of entity repository calls served so far
    pub fn entity_reads(&self) -> usize {
        self.entity_reads.load(Ordering::SeqCst)
    }

    /// Make every subsequent `record` call fail
    pub fn set_audit_failure(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    fn count_read(&self) {
        self.entity_reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityRepository for MemoryStore {
    async fn list_ids_by_category(
        &self,
        requester: &Requester,
        entity_type: EntityType,
        category_id: i64,
    ) -> Result<Vec<i64>, AppError> {
        self.count_read();
        let data = self.data.read().await;
        let mut ids: Vec<i64> = data
            .entities
            .iter()
            .filter(|e| e.export.entity_type == entity_type)
            .filter(|e| e.category_id == Some(category_id))
            .filter(|e| e.readable_by(requester))
            .map(|e| e.export.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn list_ids_by_owner(
        &self,
        requester: &Requester,
        entity_type: EntityType,
        owner_id: i64,
    ) -> Result<Vec<i64>, AppError> {
        self.count_read();
        let data = self.data.read().await;
        let mut ids: Vec<i64> = data
            .entities
            .iter()
            .filter(|e| e.export.entity_type == entity_type)
            .filter(|e| e.export.userid == owner_id)
            .filter(|e| e.readable_by(requester))
            .map(|e| e.export.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn load_for_export(
        &self,
        requester: &Requester,
        references: &[EntityReference],
    ) -> Result<Vec<EntityExport>, AppError> {
        self.count_read();
        let data = self.data.read().await;
        let exports = references
            .iter()
            .filter_map(|reference| {
                let found = data
                    .entities
                    .iter()
                    .find(|e| e.export.reference() == *reference && e.readable_by(requester))
                    .map(|e| e.export.clone());
                if found.is_none() {
                    tracing::warn!(reference = %reference, "Entity not found or not readable, skipping");
                }
                found
            })
            .collect();
        Ok(exports)
    }
}

#[async_trait]
impl TeamRepository for MemoryStore {
    async fn is_admin_of(&self, admin_id: i64, target_id: i64) -> Result<bool, AppError> {
        let data = self.data.read().await;
        let Some(target) = data.users.iter().find(|u| u.id == target_id) else {
            return Ok(false);
        };
        let is_admin = data
            .users
            .iter()
            .filter(|u| u.id == admin_id)
            .flat_map(|u| u.teams.iter())
            .filter(|(_, _, is_admin)| *is_admin)
            .any(|(team, _, _)| target.teams.iter().any(|(t, _, _)| t == team));
        Ok(is_admin)
    }

    async fn has_common_team(&self, target_id: i64, team_id: i64) -> Result<bool, AppError> {
        let data = self.data.read().await;
        Ok(data
            .users
            .iter()
            .filter(|u| u.id == target_id)
            .any(|u| u.teams.iter().any(|(t, _, _)| *t == team_id)))
    }

    async fn usage_report(&self) -> Result<Vec<UserUsage>, AppError> {
        let data = self.data.read().await;
        let mut users: Vec<&MemoryUser> = data.users.iter().collect();
        users.sort_by_key(|u| u.id);

        Ok(users
            .into_iter()
            .map(|user| {
                let owned: Vec<&MemoryEntity> = data
                    .entities
                    .iter()
                    .filter(|e| e.export.userid == user.id && !e.deleted)
                    .collect();
                let count = |entity_type: EntityType| {
                    owned
                        .iter()
                        .filter(|e| e.export.entity_type == entity_type)
                        .count() as i64
                };
                let uploads: Vec<_> = owned.iter().flat_map(|e| e.export.uploads.iter()).collect();
                let mut teams: Vec<String> =
                    user.teams.iter().map(|(_, name, _)| name.clone()).collect();
                teams.sort();

                UserUsage {
                    userid: user.id,
                    firstname: user.firstname.clone(),
                    lastname: user.lastname.clone(),
                    email: user.email.clone(),
                    teams,
                    is_sysadmin: user.is_sysadmin,
                    validated: user.validated,
                    archived: user.archived,
                    last_login: user.last_login,
                    created_at: user.created_at,
                    experiments_count: count(EntityType::Experiments),
                    timestamped_count: owned
                        .iter()
                        .filter(|e| e.export.entity_type == EntityType::Experiments)
                        .filter(|e| e.timestamped)
                        .count() as i64,
                    items_count: count(EntityType::Items),
                    uploads_count: uploads.len() as i64,
                    disk_usage_bytes: uploads.iter().map(|u| u.filesize).sum(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl SchedulerRepository for MemoryStore {
    async fn bookings(
        &self,
        team_id: i64,
        item_ids: Option<&[i64]>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<Booking>, AppError> {
        let start = start.with_timezone(&Utc);
        let end = end.with_timezone(&Utc);
        let data = self.data.read().await;
        let mut bookings: Vec<Booking> = data
            .bookings
            .iter()
            .filter(|b| b.team == team_id)
            .filter(|b| b.start < end && b.end > start)
            .filter(|b| item_ids.map_or(true, |ids| ids.contains(&b.item_id)))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
        Ok(bookings)
    }
}

#[async_trait]
impl ProcurementRequestRepository for MemoryStore {
    async fn list_for_team(&self, team_id: i64) -> Result<Vec<ProcurementRequest>, AppError> {
        let data = self.data.read().await;
        let mut requests: Vec<ProcurementRequest> = data
            .procurement_requests
            .iter()
            .filter(|r| r.team == team_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, event: &AuditExportEvent) -> Result<(), AppError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit log unavailable".to_string()));
        }
        self.data.write().await.audit_events.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_api_key_hash(&self, key_hash: &str) -> Result<Option<Requester>, AppError> {
        let data = self.data.read().await;
        let Some(&(user_id, team_id)) = data.api_keys.get(key_hash) else {
            return Ok(None);
        };
        Ok(data
            .users
            .iter()
            .find(|u| u.id == user_id && u.validated && !u.archived)
            .map(|user| Requester {
                user_id: user.id,
                team_id,
                fullname: user.fullname(),
                is_sysadmin: user.is_sysadmin,
                pdf_format: user.pdf_format,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn entity(entity_type: EntityType, id: i64, userid: i64, team: i64) -> EntityExport {
        EntityExport {
            id,
            entity_type,
            elabid: format!("20240101-{:04}", id),
            title: format!("Entity {}", id),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            body: None,
            category: None,
            status: None,
            rating: 0,
            userid,
            fullname: "Ada Lovelace".to_string(),
            team,
            created_at: Utc::now(),
            modified_at: Utc::now(),
            metadata: None,
            tags: Vec::new(),
            steps: Vec::new(),
            uploads: Vec::new(),
            changelog: Vec::new(),
        }
    }

    fn requester(user_id: i64, team_id: i64) -> Requester {
        Requester {
            user_id,
            team_id,
            fullname: "Ada Lovelace".to_string(),
            is_sysadmin: false,
            pdf_format: PdfPageFormat::A4,
        }
    }

    #[tokio::test]
    async fn test_load_for_export_keeps_reference_order() {
        let store = MemoryStore::new();
        for id in 1..=3 {
            store
                .insert_entity(MemoryEntity::new(entity(EntityType::Experiments, id, 1, 1)))
                .await;
        }
        let refs: Vec<EntityReference> = [3, 1, 2]
            .into_iter()
            .map(|id| EntityReference::new(EntityType::Experiments, id))
            .collect();

        let exports = store.load_for_export(&requester(1, 1), &refs).await.unwrap();
        let ids: Vec<i64> = exports.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_load_for_export_skips_unreadable_and_missing() {
        let store = MemoryStore::new();
        store
            .insert_entity(MemoryEntity::new(entity(EntityType::Items, 1, 2, 9)))
            .await;
        let mut private = MemoryEntity::new(entity(EntityType::Items, 2, 2, 1));
        private.visibility = Visibility::User;
        store.insert_entity(private).await;

        let refs = vec![
            EntityReference::new(EntityType::Items, 1),
            EntityReference::new(EntityType::Items, 2),
            EntityReference::new(EntityType::Items, 99),
        ];
        let exports = store.load_for_export(&requester(1, 1), &refs).await.unwrap();
        assert!(exports.is_empty());
        assert_eq!(store.entity_reads(), 1);
    }

    #[tokio::test]
    async fn test_admin_and_membership_checks() {
        let store = MemoryStore::new();
        store
            .insert_user(MemoryUser::new(1, "Ada", "Lovelace").member_of(1, "Alpha", true))
            .await;
        store
            .insert_user(MemoryUser::new(2, "Alan", "Turing").member_of(1, "Alpha", false))
            .await;
        store
            .insert_user(MemoryUser::new(3, "Grace", "Hopper").member_of(2, "Beta", false))
            .await;

        assert!(store.is_admin_of(1, 2).await.unwrap());
        assert!(!store.is_admin_of(2, 1).await.unwrap());
        assert!(!store.is_admin_of(1, 3).await.unwrap());
        assert!(store.has_common_team(2, 1).await.unwrap());
        assert!(!store.has_common_team(3, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_bookings_overlap_window() {
        let store = MemoryStore::new();
        let booking = |id: i64, day: u32| Booking {
            id,
            item_id: 10,
            item_title: "Microscope".to_string(),
            title: None,
            start: Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, day, 11, 0, 0).unwrap(),
            userid: 1,
            fullname: "Ada Lovelace".to_string(),
            team: 1,
            experiment_id: None,
        };
        store.insert_booking(booking(1, 1)).await;
        store.insert_booking(booking(2, 5)).await;

        let start = DateTime::parse_from_rfc3339("2024-03-04T00:00:00+00:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2024-03-06T00:00:00+00:00").unwrap();
        let found = store.bookings(1, None, start, end).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);

        let none = store.bookings(1, Some(&[11]), start, end).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_api_key_lookup() {
        let store = MemoryStore::new();
        store
            .insert_user(MemoryUser::new(4, "Rosalind", "Franklin").member_of(2, "Beta", false))
            .await;
        store.insert_api_key("abc123", 4, 2).await;

        let found = store.find_by_api_key_hash("abc123").await.unwrap().unwrap();
        assert_eq!(found.user_id, 4);
        assert_eq!(found.team_id, 2);
        assert_eq!(found.fullname, "Rosalind Franklin");
        assert!(store.find_by_api_key_hash("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_audit_failure_switch() {
        let store = MemoryStore::new();
        store.set_audit_failure(true);
        assert!(store.record(&AuditExportEvent::new(1, 20)).await.is_err());
        store.set_audit_failure(false);
        store.record(&AuditExportEvent::new(1, 20)).await.unwrap();
        assert_eq!(store.audit_events().await.len(), 1);
    }
}
