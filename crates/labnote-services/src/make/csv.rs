use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use labnote_core::models::{EntityExport, EntityReference};
use labnote_core::AppError;

use super::{BufferedMaker, ExportContext, CONTENT_TYPE_CSV};
use crate::render::html_to_text;

const HEADER: [&str; 11] = [
    "id", "date", "title", "content", "category", "status", "elabid", "rating", "url",
    "metadata", "tags",
];

/// Serialize records into CSV bytes, header first
pub(crate) fn write_csv<I>(header: &[&str], rows: I) -> Result<Bytes, AppError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    let buffer = writer
        .into_inner()
        .map_err(|e| AppError::Render(format!("Failed to flush CSV: {}", e)))?;
    Ok(Bytes::from(buffer))
}

/// One row per selected entity
pub struct CsvMaker {
    context: ExportContext,
    references: Vec<EntityReference>,
}

impl CsvMaker {
    pub fn new(context: ExportContext, references: Vec<EntityReference>) -> Self {
        Self {
            context,
            references,
        }
    }

    fn row(&self, entity: &EntityExport) -> Result<Vec<String>, AppError> {
        let content = match entity.body.as_deref() {
            Some(body) => html_to_text(body)?,
            None => String::new(),
        };
        let metadata = match &entity.metadata {
            Some(value) => serde_json::to_string(value)?,
            None => String::new(),
        };
        Ok(vec![
            entity.id.to_string(),
            entity.date.to_string(),
            entity.title.clone(),
            content,
            entity.category.clone().unwrap_or_default(),
            entity.status.clone().unwrap_or_default(),
            entity.elabid.clone(),
            entity.rating.to_string(),
            entity.url(&self.context.public_url),
            metadata,
            entity.tags.join("|"),
        ])
    }
}

#[async_trait]
impl BufferedMaker for CsvMaker {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn file_content(&self) -> Result<Bytes, AppError> {
        let entities = self.context.load(&self.references).await?;
        let rows = entities
            .iter()
            .map(|entity| self.row(entity))
            .collect::<Result<Vec<_>, _>>()?;
        write_csv(&HEADER, rows)
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_CSV
    }

    fn file_name(&self) -> String {
        format!("{}-export.elabftw.csv", Utc::now().format("%Y-%m-%d"))
    }
}
