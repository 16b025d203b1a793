//! Storage abstraction trait
//!
//! Attachments are written once at upload time and read back by the export makers.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not write attachment: {0}")]
    UploadFailed(String),

    #[error("Could not read attachment: {0}")]
    DownloadFailed(String),

    #[error("Attachment not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked file content as yielded by [`Storage::download_stream`]
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Attachment storage backend
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `storage_key`, replacing any previous content
    async fn upload(&self, storage_key: &str, data: Vec<u8>) -> StorageResult<()>;

    /// Read a whole attachment
    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Read an attachment chunk by chunk; archive makers copy entries this way
    async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;
}
