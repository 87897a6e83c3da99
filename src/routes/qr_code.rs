use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::Query as MultiQuery;
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use super::auth::Claims;
use super::file_response;
use crate::errors::ApiError;
use crate::models::qr_code::{ListFilter, ListQuery, QrCode, QrCodeForm};
use crate::models::template::{STYLE_TEMPLATES, StyleTemplate};
use crate::services::export::{self, ExportFormat};
use crate::services::qr_code::parse_id;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

impl FormatQuery {
    pub fn format(&self) -> Result<ExportFormat, ApiError> {
        match self.format.as_deref() {
            None | Some("") => Ok(ExportFormat::Png),
            Some(raw) => raw.parse().map_err(ApiError::BadRequest),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DuplicatePayload {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectionQuery {
    #[serde(default)]
    pub ids: Vec<Uuid>,
}

pub fn parse_filter(raw: Option<&str>) -> Result<ListFilter, ApiError> {
    raw.unwrap_or_default().parse().map_err(ApiError::BadRequest)
}

#[instrument(name = "HTTP: List QR codes", skip(state, claims, query))]
pub async fn list_handler(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<QrCode>>, ApiError> {
    let filter = parse_filter(query.filter.as_deref())?;
    let codes = state
        .qr_service
        .list(claims.user_id()?, query.search.as_deref(), filter)
        .await?;
    Ok(Json(codes))
}

#[instrument(name = "HTTP: Create QR code", skip(state, claims, form))]
pub async fn create_handler(
    State(state): State<AppState>,
    claims: Claims,
    WithRejection(Json(form), _): WithRejection<Json<QrCodeForm>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let code = state.qr_service.create(claims.user_id()?, form).await?;
    Ok((StatusCode::CREATED, Json(code)))
}

#[instrument(name = "HTTP: Get QR code", skip(state, claims))]
pub async fn get_handler(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<QrCode>, ApiError> {
    let code = state
        .qr_service
        .get(claims.user_id()?, parse_id(&id)?)
        .await?;
    Ok(Json(code))
}

#[instrument(name = "HTTP: Update QR code", skip(state, claims, form))]
pub async fn update_handler(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
    WithRejection(Json(form), _): WithRejection<Json<QrCodeForm>, ApiError>,
) -> Result<Json<QrCode>, ApiError> {
    let code = state
        .qr_service
        .update(claims.user_id()?, parse_id(&id)?, form)
        .await?;
    Ok(Json(code))
}

#[instrument(name = "HTTP: Delete QR code", skip(state, claims))]
pub async fn delete_handler(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .qr_service
        .delete(claims.user_id()?, parse_id(&id)?)
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[instrument(name = "HTTP: Duplicate QR code", skip(state, claims, payload))]
pub async fn duplicate_handler(
    State(state): State<AppState>,
    claims: Claims,
    WithRejection(Json(payload), _): WithRejection<Json<DuplicatePayload>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.id.trim().is_empty() {
        return Err(ApiError::BadRequest("ID is required".into()));
    }
    let copy = state
        .qr_service
        .duplicate(claims.user_id()?, parse_id(&payload.id)?)
        .await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

#[instrument(name = "HTTP: Toggle favorite", skip(state, claims))]
pub async fn favorite_handler(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<QrCode>, ApiError> {
    let code = state
        .qr_service
        .toggle_favorite(claims.user_id()?, parse_id(&id)?)
        .await?;
    Ok(Json(code))
}

#[instrument(name = "HTTP: Toggle sharing", skip(state, claims))]
pub async fn share_handler(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<QrCode>, ApiError> {
    let code = state
        .qr_service
        .toggle_share(claims.user_id()?, parse_id(&id)?)
        .await?;
    Ok(Json(code))
}

#[instrument(name = "HTTP: Export QR code", skip(state, claims, query))]
pub async fn export_handler(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, ApiError> {
    let format = query.format()?;
    let code = state
        .qr_service
        .get(claims.user_id()?, parse_id(&id)?)
        .await?;
    let file = export::export(&code, format)?;
    tracing::info!(qr_id = %code.id, format = format.extension(), "QR code exported");
    Ok(file_response(&file.filename, file.content_type, file.bytes))
}

#[instrument(name = "HTTP: Preview QR code", skip(state, claims))]
pub async fn preview_handler(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let code = state
        .qr_service
        .get(claims.user_id()?, parse_id(&id)?)
        .await?;
    let png = export::preview(&code)?;
    Ok(([(axum::http::header::CONTENT_TYPE, "image/png")], png))
}

#[instrument(
    name = "HTTP: Export selection",
    skip(state, claims, selection),
    fields(count = selection.ids.len())
)]
pub async fn export_zip_handler(
    State(state): State<AppState>,
    claims: Claims,
    MultiQuery(selection): MultiQuery<SelectionQuery>,
) -> Result<Response, ApiError> {
    let codes = state
        .qr_service
        .get_many(claims.user_id()?, &selection.ids)
        .await?;
    let archive = export::export_zip(&codes)?;
    Ok(file_response("qrcodes.zip", "application/zip", archive))
}

pub async fn templates_handler() -> Json<&'static [StyleTemplate]> {
    Json(&STYLE_TEMPLATES[..])
}
