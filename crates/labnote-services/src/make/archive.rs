//! Zip archive writing for streamed exports
//!
//! [`ZipStream`] drives a `zip` stream writer whose output lands in a shared buffer; the
//! buffer is drained into the [`StreamSink`] after every write, so at most one chunk of
//! compressed data is held in memory at a time.

use bytes::Bytes;
use futures::StreamExt;
use labnote_core::AppError;
use labnote_storage::{Storage, StorageError};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, ZipWriter};

use super::StreamSink;

/// Sanitize filename for archive entry to prevent path traversal.
/// Extracts only the base name (strips path components like `../`).
pub fn sanitize_archive_filename(filename: &str, fallback: &str) -> String {
    let normalized = filename.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback)
        .to_string()
}

/// Entry names already used in one archive; repeated names get a numeric suffix
#[derive(Debug, Default)]
pub struct UniqueNames {
    used: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name`, or `name (2)`, `name (3)`... when taken. The suffix goes before
    /// the extension when there is one.
    pub fn reserve(&mut self, name: &str) -> String {
        if self.used.insert(name.to_string()) {
            return name.to_string();
        }
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => {
                (stem.to_string(), format!(".{}", ext))
            }
            _ => (name.to_string(), String::new()),
        };
        let mut n = 2;
        loop {
            let candidate = format!("{} ({}){}", stem, n, extension);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn take(&self) -> io::Result<Vec<u8>> {
        let mut buffer = self
            .0
            .lock()
            .map_err(|_| io::Error::other("zip buffer lock poisoned"))?;
        Ok(std::mem::take(&mut *buffer))
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("zip buffer lock poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What was written for one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDigest {
    pub size: u64,
    pub sha256: String,
}

/// Zip archive written straight into a [`StreamSink`]
pub struct ZipStream<'a> {
    writer: ZipWriter<StreamWriter<SharedBuffer>>,
    buffer: SharedBuffer,
    sink: &'a mut StreamSink,
}

/// Open a zip archive over `sink`
pub fn zip_stream(sink: &mut StreamSink) -> ZipStream<'_> {
    let buffer = SharedBuffer::default();
    ZipStream {
        writer: ZipWriter::new_stream(buffer.clone()),
        buffer,
        sink,
    }
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

impl ZipStream<'_> {
    /// Send whatever the zip writer produced so far
    async fn drain(&mut self) -> Result<(), AppError> {
        let pending = self.buffer.take().map_err(AppError::StreamWrite)?;
        self.sink.write(Bytes::from(pending)).await
    }

    /// Add an in-memory entry
    pub async fn add_file(&mut self, name: &str, content: &[u8]) -> Result<EntryDigest, AppError> {
        self.writer.start_file(name, entry_options())?;
        self.writer.write_all(content).map_err(AppError::StreamWrite)?;
        self.drain().await?;
        Ok(EntryDigest {
            size: content.len() as u64,
            sha256: hex::encode(Sha256::digest(content)),
        })
    }

    /// Copy a stored file into the archive chunk by chunk.
    ///
    /// Returns `None` without touching the archive when the file does not exist.
    pub async fn add_stored_file(
        &mut self,
        name: &str,
        storage: &Arc<dyn Storage>,
        storage_key: &str,
    ) -> Result<Option<EntryDigest>, AppError> {
        let mut stream = match storage.download_stream(storage_key).await {
            Ok(stream) => stream,
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(storage_key = %storage_key, entry = %name, "Attachment missing from storage, skipping");
                return Ok(None);
            }
            Err(e) => return Err(AppError::Storage(e.to_string())),
        };

        self.writer.start_file(name, entry_options())?;
        let mut hasher = Sha256::new();
        let mut size = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AppError::Storage(e.to_string()))?;
            hasher.update(&chunk);
            size += chunk.len() as u64;
            self.writer.write_all(&chunk).map_err(AppError::StreamWrite)?;
            self.drain().await?;
        }
        self.drain().await?;

        Ok(Some(EntryDigest {
            size,
            sha256: hex::encode(hasher.finalize()),
        }))
    }

    /// Write the central directory and flush the tail of the archive
    pub async fn finish(self) -> Result<(), AppError> {
        let ZipStream {
            writer,
            buffer,
            sink,
        } = self;
        writer.finish()?;
        let tail = buffer.take().map_err(AppError::StreamWrite)?;
        sink.write(Bytes::from(tail)).await
    }
}
