use crate::error::HttpAppError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use labnote_core::models::Requester;
use labnote_core::AppError;

/// Authenticated user of the current request, inserted by the auth middleware
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Requester);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| {
                HttpAppError(AppError::Unauthorized(
                    "Authentication required".to_string(),
                ))
            })
    }
}
