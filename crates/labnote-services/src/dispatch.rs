//! Export dispatcher
//!
//! Picks the maker for a parsed [`ExportRequest`], resolves the selection, fires the
//! audit trigger and produces the output: buffered makers are run to completion,
//! streaming makers are started in their own task writing into a bounded channel.

use bytes::Bytes;
use labnote_core::models::{ExportFormat, ExportRequest, Requester};
use labnote_core::AppError;
use labnote_db::Repositories;
use labnote_storage::Storage;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audit::ExportAuditor;
use crate::make::{
    BufferedArtifact, CsvMaker, ElnMaker, ExportContext, JsonMaker, Maker, MultiPdfMaker,
    PdfMaker, ProcurementCsvMaker, QrPdfMaker, QrPngMaker, SchedulerReportMaker, StreamSink,
    SysadminReportMaker, ZipMaker,
};
use crate::render::{PdfRenderer, PdfWriter};
use crate::resolver::EntityResolver;

/// Maker chosen for a request, before any content is produced
pub struct PreparedExport {
    pub maker: Maker,
    /// Audit recording task, when the export crossed the threshold
    pub audit: Option<JoinHandle<()>>,
    pub reference_count: usize,
}

/// Archive being written by a background task
pub struct StreamedArtifact {
    pub content_type: &'static str,
    pub file_name: String,
    pub receiver: mpsc::Receiver<io::Result<Bytes>>,
    pub task: JoinHandle<()>,
}

pub enum ExportOutput {
    Buffered(BufferedArtifact),
    Streamed(StreamedArtifact),
}

#[derive(Clone)]
pub struct ExportDispatcher {
    repositories: Repositories,
    storage: Arc<dyn Storage>,
    renderer: Arc<dyn PdfRenderer>,
    public_url: String,
    stream_buffer: usize,
    resolver: EntityResolver,
    auditor: ExportAuditor,
}

impl ExportDispatcher {
    pub fn new(
        repositories: Repositories,
        storage: Arc<dyn Storage>,
        public_url: String,
        stream_buffer: usize,
    ) -> Self {
        let resolver = EntityResolver::new(repositories.entities.clone(), repositories.teams.clone());
        let auditor = ExportAuditor::new(repositories.audit.clone());
        Self {
            repositories,
            storage,
            renderer: Arc::new(PdfWriter),
            public_url,
            stream_buffer,
            resolver,
            auditor,
        }
    }

    fn context(&self, requester: &Requester) -> ExportContext {
        ExportContext {
            repositories: self.repositories.clone(),
            storage: self.storage.clone(),
            renderer: self.renderer.clone(),
            requester: requester.clone(),
            public_url: self.public_url.clone(),
        }
    }

    /// Authorize the request, resolve its selection and bind the maker
    pub async fn prepare(
        &self,
        requester: &Requester,
        request: &ExportRequest,
    ) -> Result<PreparedExport, AppError> {
        let format = request.format;
        let procurement_csv = format == ExportFormat::Csv && request.procurement_requests;

        if format == ExportFormat::SysadminReport && !requester.is_sysadmin {
            return Err(AppError::IllegalAction(
                "Non sysadmin user tried to generate report".to_string(),
            ));
        }

        let references = if format == ExportFormat::SysadminReport || procurement_csv {
            Vec::new()
        } else {
            self.resolver
                .resolve(requester, request.entity_type, &request.selector)
                .await?
        };
        let reference_count = references.len();
        let audit = self.auditor.record_if_needed(requester.user_id, reference_count);

        let context = self.context(requester);
        let pdfa = format.is_archival();
        let changelog = request.include_changelog();

        let maker = match format {
            ExportFormat::SysadminReport => {
                Maker::Buffered(Box::new(SysadminReportMaker::new(context)))
            }
            ExportFormat::Csv if procurement_csv => {
                Maker::Buffered(Box::new(ProcurementCsvMaker::new(context)))
            }
            ExportFormat::Csv => Maker::Buffered(Box::new(CsvMaker::new(context, references))),
            ExportFormat::Json => Maker::Buffered(Box::new(JsonMaker::new(context, references))),
            ExportFormat::Pdf | ExportFormat::PdfA => match references.as_slice() {
                [reference] => Maker::Buffered(Box::new(PdfMaker::new(
                    context, *reference, pdfa, changelog,
                ))),
                _ => Maker::Buffered(Box::new(MultiPdfMaker::new(
                    context, references, pdfa, changelog,
                ))),
            },
            ExportFormat::QrPdf => Maker::Buffered(Box::new(QrPdfMaker::new(context, references))),
            ExportFormat::QrPng => Maker::Buffered(Box::new(QrPngMaker::new(
                context,
                references,
                request.qr_size,
                request.with_title,
            ))),
            ExportFormat::SchedulerReport => Maker::Buffered(Box::new(SchedulerReportMaker::new(
                context,
                &references,
                request.start,
                request.end,
            ))),
            ExportFormat::Eln => Maker::Streaming(Box::new(ElnMaker::new(context, references))),
            ExportFormat::Zip | ExportFormat::ZipA => Maker::Streaming(Box::new(ZipMaker::new(
                context,
                references,
                pdfa,
                changelog,
                request.include_json,
            ))),
        };

        tracing::debug!(
            format = %format,
            maker = maker.name(),
            references = reference_count,
            "Export prepared"
        );
        Ok(PreparedExport {
            maker,
            audit,
            reference_count,
        })
    }

    /// Produce the export for `request` on behalf of `requester`
    #[tracing::instrument(
        skip(self, requester, request),
        fields(operation = "export", format = %request.format, user_id = requester.user_id)
    )]
    pub async fn dispatch(
        &self,
        requester: &Requester,
        request: &ExportRequest,
    ) -> Result<ExportOutput, AppError> {
        let prepared = self.prepare(requester, request).await?;

        match prepared.maker {
            Maker::Buffered(maker) => {
                let artifact = BufferedArtifact::build(maker.as_ref()).await?;
                tracing::info!(
                    maker = maker.name(),
                    size = artifact.content_size(),
                    "Export generated"
                );
                Ok(ExportOutput::Buffered(artifact))
            }
            Maker::Streaming(mut maker) => {
                let (mut sink, receiver) = StreamSink::channel(self.stream_buffer);
                let content_type = maker.content_type();
                let file_name = maker.file_name();
                let task = tokio::spawn(async move {
                    let name = maker.name();
                    match maker.write_stream(&mut sink).await {
                        Ok(()) => tracing::info!(
                            maker = name,
                            bytes = sink.bytes_sent(),
                            "Export stream finished"
                        ),
                        Err(AppError::StreamWrite(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                            tracing::warn!(
                                maker = name,
                                bytes = sink.bytes_sent(),
                                "Client went away, export stream aborted"
                            )
                        }
                        Err(e) => {
                            tracing::error!(
                                maker = name,
                                error = %e,
                                bytes = sink.bytes_sent(),
                                "Export stream failed"
                            );
                            sink.fail(&e).await;
                        }
                    }
                });
                Ok(ExportOutput::Streamed(StreamedArtifact {
                    content_type,
                    file_name,
                    receiver,
                    task,
                }))
            }
        }
    }
}
