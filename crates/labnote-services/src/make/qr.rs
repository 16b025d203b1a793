use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use labnote_core::models::EntityReference;
use labnote_core::AppError;

use super::{BufferedMaker, ExportContext, CONTENT_TYPE_PDF, CONTENT_TYPE_PNG};
use crate::render::qr::{normalize_size, render_png_sheet};
use crate::render::{Block, PdfDocument, PdfOptions, PdfSection, QrMatrix};

const QR_POINTS: f32 = 200.0;

/// A page per entity: title, QR code of its URL, and the URL itself
pub struct QrPdfMaker {
    context: ExportContext,
    references: Vec<EntityReference>,
}

impl QrPdfMaker {
    pub fn new(context: ExportContext, references: Vec<EntityReference>) -> Self {
        Self {
            context,
            references,
        }
    }
}

#[async_trait]
impl BufferedMaker for QrPdfMaker {
    fn name(&self) -> &'static str {
        "qr_pdf"
    }

    async fn file_content(&self) -> Result<Bytes, AppError> {
        let entities = self.context.load(&self.references).await?;
        let sections = entities
            .iter()
            .map(|entity| {
                let url = entity.url(&self.context.public_url);
                let mut section = PdfSection::new();
                section
                    .push(Block::Title(entity.title.clone()))
                    .push(Block::Spacer(24.0))
                    .push(Block::Qr(QrMatrix::encode(&url)?, QR_POINTS))
                    .push(Block::Spacer(12.0))
                    .push(Block::Text(url));
                Ok(section)
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        let document = PdfDocument {
            title: "QR codes".to_string(),
            author: self.context.requester.fullname.clone(),
            created_at: Utc::now(),
            sections,
        };
        let options = PdfOptions {
            page_format: self.context.requester.pdf_format,
            pdfa: false,
        };
        Ok(Bytes::from(self.context.renderer.render(&document, &options)?))
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_PDF
    }

    fn file_name(&self) -> String {
        format!("{}-qr-codes.elabftw.pdf", Utc::now().format("%Y-%m-%d"))
    }
}

/// All QR codes on one PNG sheet
pub struct QrPngMaker {
    context: ExportContext,
    references: Vec<EntityReference>,
    size: u32,
    with_title: bool,
}

impl QrPngMaker {
    /// `size` is the requested pixel size per code; non-positive means default
    pub fn new(
        context: ExportContext,
        references: Vec<EntityReference>,
        size: i64,
        with_title: bool,
    ) -> Self {
        Self {
            context,
            references,
            size: normalize_size(size),
            with_title,
        }
    }
}

#[async_trait]
impl BufferedMaker for QrPngMaker {
    fn name(&self) -> &'static str {
        "qr_png"
    }

    async fn file_content(&self) -> Result<Bytes, AppError> {
        let entities = self.context.load(&self.references).await?;
        let codes = entities
            .iter()
            .map(|entity| {
                let matrix = QrMatrix::encode(&entity.url(&self.context.public_url))?;
                Ok((matrix, entity.title.clone()))
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        Ok(Bytes::from(render_png_sheet(&codes, self.size, self.with_title)?))
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_PNG
    }

    fn file_name(&self) -> String {
        format!("{}-qr-codes.elabftw.png", Utc::now().format("%Y-%m-%d"))
    }
}
