use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use tracing::instrument;

use super::file_response;
use super::qr_code::FormatQuery;
use crate::errors::ApiError;
use crate::models::qr_code::SharedQrCode;
use crate::services::export;
use crate::startup::AppState;

#[instrument(name = "HTTP: Resolve share", skip(state, token))]
pub async fn shared_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SharedQrCode>, ApiError> {
    Ok(Json(state.qr_service.resolve_share(&token).await?))
}

#[instrument(name = "HTTP: Shared image", skip(state, token, query))]
pub async fn shared_image_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, ApiError> {
    let format = query.format()?;
    let code = state.qr_service.resolve_share_record(&token).await?;
    let file = export::export(&code, format)?;
    Ok(file_response(&file.filename, file.content_type, file.bytes))
}
