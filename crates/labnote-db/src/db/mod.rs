//! Database repositories for the export pipeline
//!
//! `traits` declares what the pipeline reads; `postgres` and `memory` are the two
//! backends. `Repositories` bundles one backend's implementations behind trait objects.

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::{MemoryEntity, MemoryStore, MemoryUser, Visibility};
pub use postgres::{
    PgAuditLogRepository, PgEntityRepository, PgProcurementRequestRepository,
    PgSchedulerRepository, PgTeamRepository, PgUserRepository,
};
pub use traits::{
    AuditSink, EntityRepository, ProcurementRequestRepository, Repositories, SchedulerRepository,
    TeamRepository, UserRepository,
};
