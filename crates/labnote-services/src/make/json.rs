use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use labnote_core::models::EntityReference;
use labnote_core::AppError;

use super::{BufferedMaker, ExportContext, CONTENT_TYPE_JSON};

/// Full entity records as a JSON array
pub struct JsonMaker {
    context: ExportContext,
    references: Vec<EntityReference>,
}

impl JsonMaker {
    pub fn new(context: ExportContext, references: Vec<EntityReference>) -> Self {
        Self {
            context,
            references,
        }
    }
}

#[async_trait]
impl BufferedMaker for JsonMaker {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn file_content(&self) -> Result<Bytes, AppError> {
        let entities = self.context.load(&self.references).await?;
        Ok(Bytes::from(serde_json::to_vec_pretty(&entities)?))
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_JSON
    }

    fn file_name(&self) -> String {
        format!("{}-export.elabftw.json", Utc::now().format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make::test_support::{context, entity};
    use labnote_core::models::EntityType;

    #[tokio::test]
    async fn test_json_array_of_entities() {
        let (context, _store, _dir) =
            context(vec![entity(EntityType::Experiments, 4, "PCR run")]).await;
        let maker = JsonMaker::new(
            context,
            vec![
                EntityReference::new(EntityType::Experiments, 4),
                EntityReference::new(EntityType::Experiments, 404),
            ],
        );
        let value: serde_json::Value =
            serde_json::from_slice(&maker.file_content().await.unwrap()).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["title"], "PCR run");
        assert_eq!(array[0]["type"], "experiments");
    }

    #[tokio::test]
    async fn test_empty_selection_is_empty_array() {
        let (context, _store, _dir) = context(Vec::new()).await;
        let content = JsonMaker::new(context, Vec::new()).file_content().await.unwrap();
        assert_eq!(content, Bytes::from_static(b"[]"));
    }
}
