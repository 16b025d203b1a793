use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use labnote_core::AppError;

use super::csv::write_csv;
use super::{BufferedMaker, ExportContext, CONTENT_TYPE_CSV};

const HEADER: [&str; 9] = [
    "id",
    "created_at",
    "requester",
    "entity_id",
    "entity_title",
    "quantity",
    "quantity_received",
    "body",
    "state",
];

/// Procurement requests of the requester's current team; ignores any entity selection
pub struct ProcurementCsvMaker {
    context: ExportContext,
}

impl ProcurementCsvMaker {
    pub fn new(context: ExportContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl BufferedMaker for ProcurementCsvMaker {
    fn name(&self) -> &'static str {
        "procurement_csv"
    }

    async fn file_content(&self) -> Result<Bytes, AppError> {
        let requests = self
            .context
            .repositories
            .procurement_requests
            .list_for_team(self.context.requester.team_id)
            .await?;
        let rows = requests.into_iter().map(|request| {
            vec![
                request.id.to_string(),
                request.created_at.to_rfc3339(),
                request.requester_fullname,
                request.entity_id.to_string(),
                request.entity_title,
                request.quantity.to_string(),
                request.quantity_received.to_string(),
                request.body.unwrap_or_default(),
                request.state.to_string(),
            ]
        });
        write_csv(&HEADER, rows)
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_CSV
    }

    fn file_name(&self) -> String {
        format!(
            "{}-procurement-requests.elabftw.csv",
            Utc::now().format("%Y-%m-%d")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make::test_support::context;
    use labnote_core::models::{ProcurementRequest, ProcurementState};

    fn request(id: i64, team: i64) -> ProcurementRequest {
        ProcurementRequest {
            id,
            team,
            created_at: Utc::now(),
            requester_fullname: "Ada Lovelace".to_string(),
            entity_id: 5,
            entity_title: "Ethanol 96%".to_string(),
            quantity: 4,
            quantity_received: 0,
            body: Some("urgent".to_string()),
            state: ProcurementState::from_code(20),
        }
    }

    #[tokio::test]
    async fn test_only_current_team_requests() {
        let (context, store, _dir) = context(Vec::new()).await;
        store.insert_procurement_request(request(1, 1)).await;
        store.insert_procurement_request(request(2, 2)).await;

        let content = ProcurementCsvMaker::new(context).file_content().await.unwrap();
        let text = String::from_utf8(content.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("1,"));
        assert!(lines[1].ends_with(",urgent,Approved"));
    }
}
