//! Shared application state

use labnote_core::Config;
use labnote_db::Repositories;
use labnote_services::ExportDispatcher;
use labnote_storage::Storage;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repositories: Repositories,
    pub storage: Arc<dyn Storage>,
    pub dispatcher: ExportDispatcher,
    /// Present when running on Postgres
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        config: &Config,
        repositories: Repositories,
        storage: Arc<dyn Storage>,
        pool: Option<PgPool>,
    ) -> Self {
        let dispatcher = ExportDispatcher::new(
            repositories.clone(),
            storage.clone(),
            config.public_url().to_string(),
            config.export_stream_buffer(),
        );
        Self {
            repositories,
            storage,
            dispatcher,
            pool,
        }
    }
}
