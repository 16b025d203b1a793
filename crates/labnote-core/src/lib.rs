//! Labnote Core Library
//!
//! Domain models, error types and configuration shared by every labnote crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

pub use config::{BaseConfig, Config, ExportServiceConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
