//! Test application over the in-memory store and a temporary storage directory

use axum_test::TestServer;
use chrono::{NaiveDate, TimeZone, Utc};
use labnote_api::auth::middleware::hash_api_key;
use labnote_api::setup::routes::setup_routes;
use labnote_api::AppState;
use labnote_core::models::{EntityExport, EntityType, Upload};
use labnote_core::{BaseConfig, Config, ExportServiceConfig};
use labnote_db::{MemoryEntity, MemoryStore, MemoryUser, Repositories};
use labnote_storage::{LocalStorage, Storage};
use std::sync::Arc;
use tempfile::TempDir;

pub const ADA_KEY: &str = "ada-api-key-0123456789abcdef";
pub const BOB_KEY: &str = "bob-api-key-0123456789abcdef";
pub const EVE_KEY: &str = "eve-api-key-0123456789abcdef";
pub const ROOT_KEY: &str = "root-api-key-0123456789abcdef";

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<dyn Storage>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn bearer(key: &str) -> String {
    format!("Bearer {}", key)
}

pub fn test_config(storage_path: &str) -> Config {
    Config(Box::new(ExportServiceConfig {
        base: BaseConfig {
            server_port: 0,
            cors_origins: vec!["*".to_string()],
            db_max_connections: 1,
            db_timeout_seconds: 1,
            environment: "test".to_string(),
        },
        database_url: None,
        local_storage_path: storage_path.to_string(),
        public_url: "https://eln.example.org".to_string(),
        export_stream_buffer: 2,
    }))
}

pub fn entity(entity_type: EntityType, id: i64, title: &str, owner: i64, team: i64) -> EntityExport {
    EntityExport {
        id,
        entity_type,
        elabid: format!("20240101-{:040x}", id),
        title: title.to_string(),
        date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        body: Some("<p>Dissolve in <em>water</em>.</p>".to_string()),
        category: Some("Protocol".to_string()),
        status: None,
        rating: 0,
        userid: owner,
        fullname: if owner == 1 { "Ada Lovelace" } else { "Bob Boole" }.to_string(),
        team,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        modified_at: Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
        metadata: None,
        tags: vec!["buffer".to_string()],
        steps: Vec::new(),
        uploads: Vec::new(),
        changelog: Vec::new(),
    }
}

/// Users:
/// - 1 Ada, admin of team 1
/// - 2 Bob, member of team 1
/// - 3 Eve, member of team 2 only
/// - 9 Root, sysadmin in team 1
///
/// Experiments 1..=3 belong to Ada, experiment 4 to Bob. Item 10 belongs to Ada and
/// carries one attachment.
pub async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path().to_str().unwrap());

    let local = LocalStorage::new(temp_dir.path()).await.unwrap();
    local
        .upload("ab/attachment.txt", b"raw data".to_vec())
        .await
        .unwrap();
    let storage: Arc<dyn Storage> = Arc::new(local);

    let store = Arc::new(MemoryStore::new());
    store
        .insert_user(MemoryUser::new(1, "Ada", "Lovelace").member_of(1, "Alpha", true))
        .await;
    store
        .insert_user(MemoryUser::new(2, "Bob", "Boole").member_of(1, "Alpha", false))
        .await;
    store
        .insert_user(MemoryUser::new(3, "Eve", "Noether").member_of(2, "Beta", false))
        .await;
    store
        .insert_user(
            MemoryUser::new(9, "Root", "Admin")
                .member_of(1, "Alpha", false)
                .sysadmin(),
        )
        .await;
    store.insert_api_key(&hash_api_key(ADA_KEY), 1, 1).await;
    store.insert_api_key(&hash_api_key(BOB_KEY), 2, 1).await;
    store.insert_api_key(&hash_api_key(EVE_KEY), 3, 2).await;
    store.insert_api_key(&hash_api_key(ROOT_KEY), 9, 1).await;

    for (id, title) in [(1, "Buffer prep"), (2, "Titration"), (3, "Größe test")] {
        store
            .insert_entity(MemoryEntity::new(entity(EntityType::Experiments, id, title, 1, 1)).in_category(5))
            .await;
    }
    store
        .insert_entity(MemoryEntity::new(entity(EntityType::Experiments, 4, "Bob's run", 2, 1)))
        .await;

    let mut item = entity(EntityType::Items, 10, "Scale", 1, 1);
    item.uploads.push(Upload {
        id: 1,
        real_name: "attachment.txt".to_string(),
        storage_key: "ab/attachment.txt".to_string(),
        filesize: 8,
        hash: None,
        comment: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
    });
    store.insert_entity(MemoryEntity::new(item)).await;

    let state = AppState::new(
        &config,
        Repositories::memory(store.clone()),
        storage.clone(),
        None,
    );
    let router = setup_routes(&config, Arc::new(state)).unwrap();
    let server = TestServer::new(router).unwrap();

    TestApp {
        server,
        store,
        storage,
        _temp_dir: temp_dir,
    }
}
