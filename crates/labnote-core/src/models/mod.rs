pub mod audit;
pub mod entity;
pub mod export;
pub mod procurement;
pub mod report;
pub mod requester;
pub mod scheduler;

pub use audit::AuditExportEvent;
pub use entity::{ChangelogEntry, EntityExport, EntityReference, EntityType, Step, Upload};
pub use export::{
    coerce_bool, coerce_int, parse_id_list, parse_report_date, Capability, EntitySelector,
    ExportFormat, ExportRequest,
};
pub use procurement::{ProcurementRequest, ProcurementState};
pub use report::UserUsage;
pub use requester::{PdfPageFormat, Requester};
pub use scheduler::Booking;
