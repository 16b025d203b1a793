use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use labnote_core::models::{EntityExport, EntityReference};
use labnote_core::AppError;
use std::sync::OnceLock;

use super::{safe_file_name, BufferedMaker, ExportContext, CONTENT_TYPE_PDF};
use crate::render::{html_to_text, Block, PdfDocument, PdfOptions, PdfSection};

const NO_ENTITIES: &str = "Nothing to export: the selection did not match any readable entry.";

/// Page content describing one entity
pub fn entity_section(
    entity: &EntityExport,
    public_url: &str,
    include_changelog: bool,
) -> Result<PdfSection, AppError> {
    let mut section = PdfSection::new();
    section
        .push(Block::Title(entity.title.clone()))
        .push(Block::Field(
            "Type".to_string(),
            format!("{} #{}", entity.entity_type, entity.id),
        ))
        .push(Block::Field("Date".to_string(), entity.date.to_string()))
        .push(Block::Field("Owner".to_string(), entity.fullname.clone()));
    if let Some(category) = &entity.category {
        section.push(Block::Field("Category".to_string(), category.clone()));
    }
    if let Some(status) = &entity.status {
        section.push(Block::Field("Status".to_string(), status.clone()));
    }
    if entity.rating > 0 {
        section.push(Block::Field("Rating".to_string(), format!("{}/5", entity.rating)));
    }
    if !entity.tags.is_empty() {
        section.push(Block::Field("Tags".to_string(), entity.tags.join(", ")));
    }
    section
        .push(Block::Field("Unique ID".to_string(), entity.elabid.clone()))
        .push(Block::Rule);

    if let Some(body) = entity.body.as_deref() {
        let text = html_to_text(body)?;
        if !text.is_empty() {
            section.push(Block::Text(text));
        }
    }

    if let Some(fields) = entity
        .metadata
        .as_ref()
        .and_then(|m| m.get("extra_fields"))
        .and_then(|f| f.as_object())
    {
        section.push(Block::Heading("Extra fields".to_string()));
        for (name, field) in fields {
            let value = match field.get("value") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            section.push(Block::Field(name.clone(), value));
        }
    }

    if !entity.steps.is_empty() {
        let steps = entity
            .steps
            .iter()
            .map(|step| {
                let mark = if step.finished { "[x]" } else { "[ ]" };
                format!("{} {}", mark, step.body)
            })
            .collect::<Vec<_>>()
            .join("\n");
        section
            .push(Block::Heading("Steps".to_string()))
            .push(Block::Text(steps));
    }

    if !entity.uploads.is_empty() {
        let uploads = entity
            .uploads
            .iter()
            .map(|upload| {
                let mut line = format!("{} ({} bytes)", upload.real_name, upload.filesize);
                if let Some(comment) = upload.comment.as_deref().filter(|c| !c.is_empty()) {
                    line.push_str(&format!(": {}", comment));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n");
        section
            .push(Block::Heading("Attached files".to_string()))
            .push(Block::Text(uploads));
    }

    if include_changelog && !entity.changelog.is_empty() {
        let changelog = entity
            .changelog
            .iter()
            .map(|entry| {
                format!(
                    "{} {} changed {}: {}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.fullname,
                    entry.target,
                    entry.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        section
            .push(Block::Heading("Changelog".to_string()))
            .push(Block::Text(changelog));
    }

    section
        .push(Block::Spacer(12.0))
        .push(Block::Field("Link".to_string(), entity.url(public_url)));
    Ok(section)
}

/// Render entities to PDF bytes with the context's renderer
pub(crate) fn render_entities(
    context: &ExportContext,
    title: &str,
    entities: &[EntityExport],
    pdfa: bool,
    include_changelog: bool,
) -> Result<Vec<u8>, AppError> {
    let mut sections = entities
        .iter()
        .map(|entity| entity_section(entity, &context.public_url, include_changelog))
        .collect::<Result<Vec<_>, _>>()?;
    if sections.is_empty() {
        let mut placeholder = PdfSection::new();
        placeholder.push(Block::Text(NO_ENTITIES.to_string()));
        sections.push(placeholder);
    }
    let document = PdfDocument {
        title: title.to_string(),
        author: context.requester.fullname.clone(),
        created_at: Utc::now(),
        sections,
    };
    let options = PdfOptions {
        page_format: context.requester.pdf_format,
        pdfa,
    };
    context.renderer.render(&document, &options)
}

/// PDF of exactly one entity
pub struct PdfMaker {
    context: ExportContext,
    reference: EntityReference,
    pdfa: bool,
    include_changelog: bool,
    file_name: OnceLock<String>,
}

impl PdfMaker {
    pub fn new(
        context: ExportContext,
        reference: EntityReference,
        pdfa: bool,
        include_changelog: bool,
    ) -> Self {
        Self {
            context,
            reference,
            pdfa,
            include_changelog,
            file_name: OnceLock::new(),
        }
    }
}

#[async_trait]
impl BufferedMaker for PdfMaker {
    fn name(&self) -> &'static str {
        if self.pdfa {
            "pdfa"
        } else {
            "pdf"
        }
    }

    async fn file_content(&self) -> Result<Bytes, AppError> {
        let entity = self
            .context
            .load(std::slice::from_ref(&self.reference))
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("Entity {} not found", self.reference)))?;
        let _ = self.file_name.set(format!(
            "{} - {} - {}.pdf",
            Utc::now().format("%Y-%m-%d"),
            safe_file_name(&entity.title),
            entity.short_elabid()
        ));
        let bytes = render_entities(
            &self.context,
            &entity.title,
            std::slice::from_ref(&entity),
            self.pdfa,
            self.include_changelog,
        )?;
        Ok(Bytes::from(bytes))
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_PDF
    }

    /// Named after the entity once content was produced
    fn file_name(&self) -> String {
        self.file_name.get().cloned().unwrap_or_else(|| {
            format!(
                "{}-{}.elabftw.pdf",
                Utc::now().format("%Y-%m-%d"),
                self.reference.entity_type
            )
        })
    }
}

/// One PDF with a section per entity
pub struct MultiPdfMaker {
    context: ExportContext,
    references: Vec<EntityReference>,
    pdfa: bool,
    include_changelog: bool,
}

impl MultiPdfMaker {
    pub fn new(
        context: ExportContext,
        references: Vec<EntityReference>,
        pdfa: bool,
        include_changelog: bool,
    ) -> Self {
        Self {
            context,
            references,
            pdfa,
            include_changelog,
        }
    }
}

#[async_trait]
impl BufferedMaker for MultiPdfMaker {
    fn name(&self) -> &'static str {
        if self.pdfa {
            "multi_pdfa"
        } else {
            "multi_pdf"
        }
    }

    async fn file_content(&self) -> Result<Bytes, AppError> {
        let entities = self.context.load(&self.references).await?;
        let bytes = render_entities(
            &self.context,
            "Export",
            &entities,
            self.pdfa,
            self.include_changelog,
        )?;
        Ok(Bytes::from(bytes))
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_PDF
    }

    fn file_name(&self) -> String {
        format!("{}-export.elabftw.pdf", Utc::now().format("%Y-%m-%d"))
    }
}
