//! Ingress-layer error taxonomy and its JSON rendering. The ingress never
//! retries; it only ever translates a `RepoError` (or a binding failure)
//! into a status code and the `{"message", "layer"}` body contract.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use urlshort_core::RepoError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("shortcode not found")]
    NotFound,

    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    layer: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, layer, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "ingress", msg.clone()),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "store",
                "shortcode not found".to_string(),
            ),
            AppError::Repo(RepoError::NotFound) => (
                StatusCode::NOT_FOUND,
                "store",
                "shortcode not found".to_string(),
            ),
            AppError::Repo(RepoError::IntegrityViolation(_)) => {
                // The ingress writes synchronously only under the
                // broker-down fallback; a duplicate there is a genuine
                // client error, distinct from the asynchronous path where
                // the consumer acks duplicates silently.
                (
                    StatusCode::BAD_REQUEST,
                    "store",
                    "shortcode already exists".to_string(),
                )
            }
            AppError::Repo(RepoError::Transient(e)) => {
                tracing::error!(error = %e, "store failed transiently");
                (
                    StatusCode::BAD_REQUEST,
                    "store",
                    "failed to store url".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { message, layer })).into_response()
    }
}
