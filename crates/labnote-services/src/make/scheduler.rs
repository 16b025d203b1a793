use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use labnote_core::models::{EntityReference, EntityType};
use labnote_core::AppError;

use super::csv::write_csv;
use super::{BufferedMaker, ExportContext, CONTENT_TYPE_CSV};

const HEADER: [&str; 10] = [
    "id",
    "item_id",
    "item",
    "title",
    "start",
    "end",
    "duration_hours",
    "userid",
    "fullname",
    "experiment_id",
];

/// Bookings overlapping a time window, for the selected items or the whole team
pub struct SchedulerReportMaker {
    context: ExportContext,
    item_ids: Vec<i64>,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl SchedulerReportMaker {
    pub fn new(
        context: ExportContext,
        references: &[EntityReference],
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        let item_ids = references
            .iter()
            .filter(|r| r.entity_type == EntityType::Items)
            .map(|r| r.id)
            .collect();
        Self {
            context,
            item_ids,
            start,
            end,
        }
    }
}

#[async_trait]
impl BufferedMaker for SchedulerReportMaker {
    fn name(&self) -> &'static str {
        "scheduler_report"
    }

    async fn file_content(&self) -> Result<Bytes, AppError> {
        let items = (!self.item_ids.is_empty()).then_some(self.item_ids.as_slice());
        let bookings = self
            .context
            .repositories
            .scheduler
            .bookings(self.context.requester.team_id, items, self.start, self.end)
            .await?;
        tracing::debug!(count = bookings.len(), "Scheduler report bookings loaded");

        let rows = bookings.into_iter().map(|booking| {
            let duration = format!("{:.2}", booking.duration_hours());
            vec![
                booking.id.to_string(),
                booking.item_id.to_string(),
                booking.item_title,
                booking.title.unwrap_or_default(),
                booking.start.to_rfc3339(),
                booking.end.to_rfc3339(),
                duration,
                booking.userid.to_string(),
                booking.fullname,
                booking
                    .experiment_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            ]
        });
        write_csv(&HEADER, rows)
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_CSV
    }

    fn file_name(&self) -> String {
        format!(
            "{}-{}-scheduler-report.elabftw.csv",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make::test_support::context;
    use chrono::{TimeZone, Utc};
    use labnote_core::models::{Booking, ExportFormat, ExportRequest};

    fn booking(id: i64, item_id: i64) -> Booking {
        Booking {
            id,
            item_id,
            item_title: "Confocal".to_string(),
            title: Some("Imaging".to_string()),
            start: Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 5, 2, 10, 30, 0).unwrap(),
            userid: 1,
            fullname: "Ada Lovelace".to_string(),
            team: 1,
            experiment_id: None,
        }
    }

    #[tokio::test]
    async fn test_no_bookings_gives_header_only() {
        let (context, _store, _dir) = context(Vec::new()).await;
        let request = ExportRequest::new(ExportFormat::SchedulerReport);
        let maker = SchedulerReportMaker::new(context, &[], request.start, request.end);
        let content = maker.file_content().await.unwrap();
        assert_eq!(
            content,
            Bytes::from_static(
                b"id,item_id,item,title,start,end,duration_hours,userid,fullname,experiment_id\n"
            )
        );
        assert_eq!(
            maker.file_name(),
            "2018-12-23-2119-12-23-scheduler-report.elabftw.csv"
        );
    }

    #[tokio::test]
    async fn test_selected_items_filter_bookings() {
        let (context, store, _dir) = context(Vec::new()).await;
        store.insert_booking(booking(1, 10)).await;
        store.insert_booking(booking(2, 11)).await;
        let request = ExportRequest::new(ExportFormat::SchedulerReport);

        let references = vec![EntityReference::new(EntityType::Items, 11)];
        let maker = SchedulerReportMaker::new(context.clone(), &references, request.start, request.end);
        let text = String::from_utf8(maker.file_content().await.unwrap().to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("2,11,Confocal,Imaging,"));
        assert!(lines[1].contains(",1.50,"));

        let maker = SchedulerReportMaker::new(context, &[], request.start, request.end);
        let text = String::from_utf8(maker.file_content().await.unwrap().to_vec()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
