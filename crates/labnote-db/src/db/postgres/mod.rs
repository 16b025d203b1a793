//! PostgreSQL repositories

mod audit;
mod entity;
mod procurement;
mod scheduler;
mod team;
mod user;

pub use audit::PgAuditLogRepository;
pub use entity::PgEntityRepository;
pub use procurement::PgProcurementRequestRepository;
pub use scheduler::PgSchedulerRepository;
pub use team::PgTeamRepository;
pub use user::PgUserRepository;
