use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthCheckResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthCheckResponse),
        (status = 503, description = "Database unreachable", body = HealthCheckResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    const TIMEOUT: Duration = Duration::from_secs(5);

    let mut response = HealthCheckResponse {
        status: "healthy".to_string(),
        database: "in_memory".to_string(),
        storage: "unknown".to_string(),
    };
    let mut overall_healthy = true;

    if let Some(pool) = &state.pool {
        match tokio::time::timeout(TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
            Ok(Ok(_)) => {
                response.database = "healthy".to_string();
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Database health check failed");
                response.database = format!("unhealthy: {}", e);
                overall_healthy = false;
            }
            Err(_) => {
                tracing::error!("Database health check timed out");
                response.database = "timeout".to_string();
                overall_healthy = false;
            }
        }
    }

    // Storage problems degrade the report but do not fail it
    match tokio::time::timeout(TIMEOUT, state.storage.exists("health-check-non-existent-key")).await
    {
        Ok(Ok(_)) => {
            response.storage = "healthy".to_string();
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Storage health check warning");
            response.storage = format!("degraded: {}", e);
        }
        Err(_) => {
            tracing::warn!("Storage health check timed out");
            response.storage = "timeout".to_string();
        }
    }

    if !overall_healthy {
        response.status = "unhealthy".to_string();
        return (StatusCode::SERVICE_UNAVAILABLE, Json(response));
    }

    (StatusCode::OK, Json(response))
}
