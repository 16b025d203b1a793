//! API key authentication
//!
//! Clients send `Authorization: Bearer <key>`. Keys are stored as their SHA-256 hex
//! digest and looked up through the [`UserRepository`].

use crate::auth::models::CurrentUser;
use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use labnote_core::AppError;
use labnote_db::UserRepository;
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthState {
    pub users: Arc<dyn UserRepository>,
}

/// Hex encoded SHA-256 of a raw API key, as stored in `api_keys.key_hash`
pub fn hash_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

fn unauthorized(message: &str) -> Response {
    HttpAppError(AppError::Unauthorized(message.to_string())).into_response()
}

pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(auth_header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return unauthorized("Missing authorization header");
    };

    let Some(api_key) = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|key| !key.is_empty())
    else {
        return unauthorized("Invalid authorization header format");
    };

    match auth_state
        .users
        .find_by_api_key_hash(&hash_api_key(api_key))
        .await
    {
        Ok(Some(requester)) => {
            tracing::debug!(
                user_id = requester.user_id,
                team_id = requester.team_id,
                "Request authenticated"
            );
            request.extensions_mut().insert(CurrentUser(requester));
            next.run(request).await
        }
        Ok(None) => {
            tracing::warn!("Rejected request with unknown API key");
            unauthorized("Invalid API key")
        }
        Err(e) => HttpAppError(e).into_response(),
    }
}
