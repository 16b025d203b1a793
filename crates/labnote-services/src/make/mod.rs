//! Export makers
//!
//! One maker per export format. Each implements exactly one capability contract:
//! [`BufferedMaker`] builds the whole file in memory, [`StreamingMaker`] writes an archive
//! chunk by chunk into a [`StreamSink`]. Makers pull their data through the
//! [`ExportContext`] they are built with.

mod archive;
mod csv;
mod eln;
mod json;
mod pdf;
mod procurement;
mod qr;
mod report;
mod scheduler;
mod zip;

use async_trait::async_trait;
use bytes::Bytes;
use labnote_core::models::{EntityExport, EntityReference, Requester};
use labnote_core::AppError;
use labnote_db::Repositories;
use labnote_storage::Storage;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::render::PdfRenderer;

pub use self::archive::{sanitize_archive_filename, zip_stream, EntryDigest, UniqueNames, ZipStream};
pub use self::csv::CsvMaker;
pub use self::eln::ElnMaker;
pub use self::json::JsonMaker;
pub use self::pdf::{entity_section, MultiPdfMaker, PdfMaker};
pub use self::procurement::ProcurementCsvMaker;
pub use self::qr::{QrPdfMaker, QrPngMaker};
pub use self::report::SysadminReportMaker;
pub use self::scheduler::SchedulerReportMaker;
pub use self::zip::ZipMaker;

pub const CONTENT_TYPE_CSV: &str = "text/csv; charset=UTF-8";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_PDF: &str = "application/pdf";
pub const CONTENT_TYPE_PNG: &str = "image/png";
pub const CONTENT_TYPE_ZIP: &str = "application/zip";
pub const CONTENT_TYPE_ELN: &str = "application/vnd.eln+zip";

/// Everything a maker may read while producing one export
#[derive(Clone)]
pub struct ExportContext {
    pub repositories: Repositories,
    pub storage: Arc<dyn Storage>,
    pub renderer: Arc<dyn PdfRenderer>,
    pub requester: Requester,
    /// Base URL used for entity links and QR codes
    pub public_url: String,
}

impl ExportContext {
    /// Load the readable entities among `references`, in reference order
    pub async fn load(&self, references: &[EntityReference]) -> Result<Vec<EntityExport>, AppError> {
        self.repositories
            .entities
            .load_for_export(&self.requester, references)
            .await
    }
}

/// Maker producing a complete file in memory
#[async_trait]
pub trait BufferedMaker: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn file_content(&self) -> Result<Bytes, AppError>;

    fn content_type(&self) -> &'static str;

    fn file_name(&self) -> String;
}

/// Maker writing an archive incrementally
#[async_trait]
pub trait StreamingMaker: Send + Sync {
    fn name(&self) -> &'static str;

    fn content_type(&self) -> &'static str;

    fn file_name(&self) -> String;

    /// Write every entry and finish the container. Called once per maker.
    async fn write_stream(&mut self, sink: &mut StreamSink) -> Result<(), AppError>;
}

/// A maker bound to its capability
pub enum Maker {
    Buffered(Box<dyn BufferedMaker>),
    Streaming(Box<dyn StreamingMaker>),
}

impl Maker {
    pub fn name(&self) -> &'static str {
        match self {
            Maker::Buffered(maker) => maker.name(),
            Maker::Streaming(maker) => maker.name(),
        }
    }
}

/// Fully materialized export
#[derive(Debug, Clone)]
pub struct BufferedArtifact {
    pub content: Bytes,
    pub content_type: &'static str,
    pub file_name: String,
}

impl BufferedArtifact {
    pub async fn build(maker: &dyn BufferedMaker) -> Result<Self, AppError> {
        let content = maker.file_content().await?;
        Ok(Self {
            content,
            content_type: maker.content_type(),
            file_name: maker.file_name(),
        })
    }

    pub fn content_size(&self) -> usize {
        self.content.len()
    }
}

/// Write side of a streamed response body.
///
/// Backed by a bounded channel: `write` waits while the body is behind, and fails with
/// `BrokenPipe` once the receiving side is gone.
pub struct StreamSink {
    sender: mpsc::Sender<io::Result<Bytes>>,
    bytes_sent: u64,
}

impl StreamSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<io::Result<Bytes>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                bytes_sent: 0,
            },
            receiver,
        )
    }

    pub async fn write(&mut self, chunk: Bytes) -> Result<(), AppError> {
        if chunk.is_empty() {
            return Ok(());
        }
        let len = chunk.len() as u64;
        self.sender.send(Ok(chunk)).await.map_err(|_| {
            AppError::StreamWrite(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "export stream receiver closed",
            ))
        })?;
        self.bytes_sent += len;
        Ok(())
    }

    /// Terminate the body with an error so the client sees a truncated transfer
    pub async fn fail(&mut self, error: &AppError) {
        let _ = self
            .sender
            .send(Err(io::Error::other(error.to_string())))
            .await;
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

/// Replace characters that are not allowed in file names on common file systems
pub fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("a/b:c?.pdf"), "a-b-c-.pdf");
        assert_eq!(safe_file_name("  ..  "), "untitled");
        assert_eq!(safe_file_name("Größe"), "Größe");
    }

    #[tokio::test]
    async fn test_sink_reports_broken_pipe() {
        let (mut sink, receiver) = StreamSink::channel(1);
        drop(receiver);
        let err = sink.write(Bytes::from_static(b"data")).await.unwrap_err();
        match err {
            AppError::StreamWrite(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sink_counts_bytes() {
        let (mut sink, mut receiver) = StreamSink::channel(2);
        sink.write(Bytes::from_static(b"abc")).await.unwrap();
        sink.write(Bytes::new()).await.unwrap();
        assert_eq!(sink.bytes_sent(), 3);
        assert_eq!(receiver.recv().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
    }
}
