//! Labnote data access layer
//!
//! Repository traits consumed by the export pipeline, with a PostgreSQL implementation
//! (`sqlx`) and an in-memory implementation used by tests and database-less deployments.

pub mod db;

pub use db::*;
