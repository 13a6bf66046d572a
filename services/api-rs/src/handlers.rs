use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use crate::dto::StoreUrlRequest;
use crate::error::AppError;
use crate::state::AppState;

// ── POST / ────────────────────────────────────────────────────────────────

pub async fn store(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StoreUrlRequest>,
) -> Result<Response, AppError> {
    if payload.url.is_empty() {
        return Err(AppError::BadRequest("url must not be empty".to_string()));
    }
    if payload.shortcode.is_empty() {
        return Err(AppError::BadRequest(
            "shortcode must not be empty".to_string(),
        ));
    }

    state
        .service
        .store(&payload.url, &payload.shortcode)
        .await?;

    Ok(StatusCode::CREATED.into_response())
}

// ── GET /:shortcode ───────────────────────────────────────────────────────

pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(shortcode): Path<String>,
) -> Result<Response, AppError> {
    let record = state.service.get(&shortcode).await?;

    Ok((
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, record.url)],
    )
        .into_response())
}
