//! Labnote API Library
//!
//! HTTP surface of the export pipeline: the `/make` controller, API key
//! authentication and application setup.

mod api_doc;
mod handlers;
mod telemetry;

pub mod auth;
pub mod error;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
