//! Export controller
//!
//! `GET /make` (and the procurement requests path) turn query parameters into an
//! [`ExportRequest`], hand it to the dispatcher and wrap the artifact in a response:
//! buffered artifacts are sent inline with their size, archives are streamed as
//! attachments.

use crate::auth::models::CurrentUser;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderValue, Response, StatusCode, Uri},
    response::IntoResponse,
};
use chrono::Utc;
use labnote_core::constants::{FALLBACK_ARCHIVE_NAME, PROCUREMENT_REQUESTS_PATH};
use labnote_core::models::{
    coerce_bool, coerce_int, parse_id_list, parse_report_date, EntitySelector, EntityType,
    ExportFormat, ExportRequest,
};
use labnote_core::AppError;
use labnote_services::{BufferedArtifact, ExportOutput, StreamedArtifact};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

/// Characters left as-is in an RFC 5987 `filename*` value
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Raw query parameters. Everything is kept as text and coerced leniently.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MakeQuery {
    /// Export format; unknown or missing values fall back to json
    pub format: Option<String>,
    /// Entity type of the selection: experiments, items, experiments_templates, items_types
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    /// Select every readable entity of this category
    pub category: Option<String>,
    /// Select every entity owned by this user
    pub owner: Option<String>,
    /// Space separated list of entity ids
    pub id: Option<String>,
    /// Include the changelog in PDF output
    pub changelog: Option<String>,
    /// QR code size in pixels
    pub size: Option<String>,
    /// Print entity titles under QR codes
    #[serde(rename = "withTitle")]
    pub with_title: Option<String>,
    /// Scheduler report range start (ISO 8601 with offset)
    pub start: Option<String>,
    /// Scheduler report range end (ISO 8601 with offset)
    pub end: Option<String>,
    /// Add JSON exports inside zip archives
    pub json: Option<String>,
}

impl MakeQuery {
    /// Build the export request. Selection precedence is category, then owner, then ids;
    /// without a valid type nothing is selected.
    pub fn into_request(self, procurement_requests: bool) -> Result<ExportRequest, AppError> {
        let mut request = ExportRequest::new(ExportFormat::from_query(self.format.as_deref()));

        request.start = parse_report_date(self.start.as_deref(), request.start, "start")?;
        request.end = parse_report_date(self.end.as_deref(), request.end, "end")?;
        request.changelog = self.changelog.as_deref().map(coerce_bool);
        request.qr_size = self.size.as_deref().map(coerce_int).unwrap_or(0);
        request.with_title = self.with_title.as_deref().map(coerce_bool).unwrap_or(false);
        request.include_json = self.json.as_deref().map(coerce_bool).unwrap_or(false);
        request.procurement_requests = procurement_requests;

        let entity_type = self
            .entity_type
            .as_deref()
            .and_then(|raw| raw.parse::<EntityType>().ok());
        if let Some(entity_type) = entity_type {
            let selector = if let Some(category) = self.category.as_deref() {
                EntitySelector::Category(coerce_int(category))
            } else if let Some(owner) = self.owner.as_deref() {
                EntitySelector::Owner(coerce_int(owner))
            } else if let Some(ids) = self.id.as_deref() {
                EntitySelector::Ids(parse_id_list(ids))
            } else {
                EntitySelector::None
            };
            request = request.with_selection(entity_type, selector);
        }

        Ok(request)
    }
}

fn is_header_safe(c: char) -> bool {
    (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\'
}

fn is_ascii_safe(name: &str) -> bool {
    name.chars().all(is_header_safe)
}

/// `Content-Disposition` value for `file_name`. Names that cannot travel as a plain
/// quoted string get `fallback` plus an RFC 5987 `filename*` parameter.
fn content_disposition(disposition: &str, file_name: &str, fallback: &str) -> String {
    if is_ascii_safe(file_name) {
        format!("{}; filename=\"{}\"", disposition, file_name)
    } else {
        format!(
            "{}; filename=\"{}\"; filename*=UTF-8''{}",
            disposition,
            fallback,
            utf8_percent_encode(file_name, ATTR_CHAR)
        )
    }
}

/// Plain ASCII stand-in for a buffered file name
fn ascii_fallback(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| if is_header_safe(c) { c } else { '_' })
        .collect()
}

fn header_value(value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Internal(format!("Invalid header value: {}", e)))
}

fn buffered_response(artifact: BufferedArtifact) -> Result<Response<Body>, AppError> {
    let disposition = content_disposition(
        "inline",
        &artifact.file_name,
        &ascii_fallback(&artifact.file_name),
    );
    let last_modified = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.content_type)
        .header("Content-Size", artifact.content_size())
        .header(header::CONTENT_DISPOSITION, header_value(&disposition)?)
        .header(header::CACHE_CONTROL, "no-store")
        .header(header::LAST_MODIFIED, header_value(&last_modified)?)
        .body(Body::from(artifact.content))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

fn streamed_response(artifact: StreamedArtifact) -> Result<Response<Body>, AppError> {
    let disposition = content_disposition("attachment", &artifact.file_name, FALLBACK_ARCHIVE_NAME);

    // The writer task runs detached; dropping the body closes the channel and stops it
    let body_stream = futures::stream::unfold(artifact.receiver, |mut receiver| async move {
        receiver.recv().await.map(|chunk| (chunk, receiver))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.content_type)
        .header(header::CONTENT_DISPOSITION, header_value(&disposition)?)
        .header(header::CACHE_CONTROL, "no-store")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

#[utoipa::path(
    get,
    path = "/make",
    tag = "exports",
    params(MakeQuery),
    responses(
        (status = 200, description = "Export file; archives are streamed", content_type = "application/octet-stream"),
        (status = 400, description = "Invalid query parameter", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 403, description = "Selection or format not allowed", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, user, query, uri),
    fields(user_id = user.0.user_id, team_id = user.0.team_id, operation = "make_export")
)]
pub async fn make_export(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    uri: Uri,
    query: Result<Query<MakeQuery>, QueryRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Query(query) = query?;
    let procurement_requests = uri.path().starts_with(PROCUREMENT_REQUESTS_PATH);
    let request = query.into_request(procurement_requests)?;

    tracing::debug!(
        format = %request.format,
        entity_type = ?request.entity_type,
        selector = ?request.selector,
        "Export requested"
    );

    let response = match state.dispatcher.dispatch(&user.0, &request).await? {
        ExportOutput::Buffered(artifact) => buffered_response(artifact)?,
        ExportOutput::Streamed(artifact) => streamed_response(artifact)?,
    };

    Ok(response)
}
