use async_trait::async_trait;
use chrono::Utc;
use labnote_core::models::EntityReference;
use labnote_core::AppError;

use super::archive::{sanitize_archive_filename, zip_stream, UniqueNames};
use super::pdf::render_entities;
use super::{safe_file_name, ExportContext, StreamSink, StreamingMaker, CONTENT_TYPE_ZIP};

const ALL_ENTITIES_JSON: &str = "export-elabftw.json";

/// Zip archive with a folder per entity holding its PDF, attachments and optionally JSON
pub struct ZipMaker {
    context: ExportContext,
    references: Vec<EntityReference>,
    pdfa: bool,
    include_changelog: bool,
    include_json: bool,
}

impl ZipMaker {
    pub fn new(
        context: ExportContext,
        references: Vec<EntityReference>,
        pdfa: bool,
        include_changelog: bool,
        include_json: bool,
    ) -> Self {
        Self {
            context,
            references,
            pdfa,
            include_changelog,
            include_json,
        }
    }
}

#[async_trait]
impl StreamingMaker for ZipMaker {
    fn name(&self) -> &'static str {
        if self.pdfa {
            "zipa"
        } else {
            "zip"
        }
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_ZIP
    }

    fn file_name(&self) -> String {
        format!("{}-export.elabftw.zip", Utc::now().format("%Y-%m-%d"))
    }

    #[tracing::instrument(skip(self, sink), fields(operation = "zip_export", pdfa = self.pdfa))]
    async fn write_stream(&mut self, sink: &mut StreamSink) -> Result<(), AppError> {
        let entities = self.context.load(&self.references).await?;
        let mut zip = zip_stream(sink);
        let mut folders = UniqueNames::new();
        if self.include_json {
            folders.reserve(ALL_ENTITIES_JSON);
        }

        for entity in &entities {
            let title = safe_file_name(&entity.title);
            let folder = folders.reserve(&format!("{} - {}", title, entity.short_elabid()));
            let mut names = UniqueNames::new();

            let pdf = render_entities(
                &self.context,
                &entity.title,
                std::slice::from_ref(entity),
                self.pdfa,
                self.include_changelog,
            )?;
            let pdf_name = names.reserve(&format!("{}.pdf", title));
            zip.add_file(&format!("{}/{}", folder, pdf_name), &pdf).await?;
            let json_name = self
                .include_json
                .then(|| names.reserve(&format!("{}.json", title)));

            for upload in &entity.uploads {
                let fallback = format!("upload-{}", upload.id);
                let name = names.reserve(&sanitize_archive_filename(&upload.real_name, &fallback));
                zip.add_stored_file(
                    &format!("{}/{}", folder, name),
                    &self.context.storage,
                    &upload.storage_key,
                )
                .await?;
            }

            if let Some(json_name) = json_name {
                let json = serde_json::to_vec_pretty(entity)?;
                zip.add_file(&format!("{}/{}", folder, json_name), &json).await?;
            }
        }

        if self.include_json {
            let json = serde_json::to_vec_pretty(&entities)?;
            zip.add_file(ALL_ENTITIES_JSON, &json).await?;
        }
        zip.finish().await?;
        tracing::debug!(entities = entities.len(), "Zip archive written");
        Ok(())
    }
}
