//! Storage setup and initialization

use anyhow::Result;
use labnote_core::Config;
use labnote_storage::{LocalStorage, Storage};
use std::sync::Arc;

/// Open the attachment store under the configured directory
pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!(
        path = %config.local_storage_path(),
        "Initializing local storage..."
    );
    let storage = LocalStorage::new(config.local_storage_path()).await?;
    Ok(Arc::new(storage))
}
