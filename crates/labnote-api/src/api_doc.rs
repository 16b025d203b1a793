use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::ErrorResponse;
use crate::handlers;
use labnote_core::models::{EntityType, ExportFormat};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Labnote Export API",
        version = "0.1.0",
        description = "Export notebook entries as CSV, JSON, PDF, PDF/A, QR codes, zip and ELN archives, plus scheduler, procurement and usage reports"
    ),
    paths(
        handlers::health::health_check,
        handlers::make::make_export,
    ),
    components(
        schemas(
            ErrorResponse,
            ExportFormat,
            EntityType,
            handlers::health::HealthCheckResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service health"),
        (name = "exports", description = "Export generation")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("API key sent as a bearer token"))
                        .build(),
                ),
            );
        }
    }
}
