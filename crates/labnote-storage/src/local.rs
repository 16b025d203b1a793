use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Attachments kept as plain files under one directory
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Open the store at `root`, creating the directory when missing
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Cannot create attachment directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// Map a storage key to a file under the root. Only plain relative components are
    /// accepted.
    fn resolve(&self, storage_key: &str) -> StorageResult<PathBuf> {
        let key = Path::new(storage_key);
        let plain = !storage_key.is_empty()
            && key
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(StorageError::InvalidKey(storage_key.to_string()));
        }
        Ok(self.root.join(key))
    }

    /// Path of an existing attachment, or `NotFound`
    async fn existing(&self, storage_key: &str) -> StorageResult<PathBuf> {
        let path = self.resolve(storage_key)?;
        match fs::try_exists(&path).await {
            Ok(true) => Ok(path),
            Ok(false) => Err(StorageError::NotFound(storage_key.to_string())),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, storage_key: &str, data: Vec<u8>) -> StorageResult<()> {
        let path = self.resolve(storage_key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let write = async {
            let mut file = fs::File::create(&path).await?;
            file.write_all(&data).await?;
            file.sync_all().await
        };
        write
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", storage_key, e)))?;

        tracing::debug!(key = %storage_key, size_bytes = data.len(), "Attachment stored");
        Ok(())
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let path = self.existing(storage_key).await?;
        fs::read(&path)
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("{}: {}", storage_key, e)))
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        let path = self.existing(storage_key).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("{}: {}", storage_key, e)))?;

        let key = storage_key.to_string();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |chunk| {
            chunk.map_err(|e| {
                tracing::error!(key = %key, error = %e, "Attachment read failed mid-stream");
                StorageError::DownloadFailed(format!("{}: {}", key, e))
            })
        });
        Ok(Box::pin(stream))
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        match self.existing(storage_key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
