//! Database setup and initialization

use anyhow::{Context, Result};
use labnote_core::Config;
use labnote_db::{MemoryStore, Repositories};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Connect to Postgres and run migrations, or fall back to the in-memory store when no
/// database URL is configured.
pub async fn setup_database(config: &Config) -> Result<(Option<PgPool>, Repositories)> {
    let Some(database_url) = config.database_url() else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store");
        return Ok((None, Repositories::memory(Arc::new(MemoryStore::new()))));
    };

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );

    // Path: workspace migrations/ from crate root
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let repositories = Repositories::postgres(pool.clone());
    Ok((Some(pool), repositories))
}
