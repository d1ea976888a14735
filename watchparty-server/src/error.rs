//! HTTP error mapping

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::warn;
use watchparty_core::MediaError;

/// Errors returned by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Video not found")]
    NotFound,

    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("{0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::NotFound => ApiError::NotFound,
            MediaError::RangeNotSatisfiable { size } => ApiError::RangeNotSatisfiable { size },
            // Removed between the stat and the open
            MediaError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ApiError::NotFound,
            MediaError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, message).into_response(),
            ApiError::RangeNotSatisfiable { size } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", size))],
            )
                .into_response(),
            ApiError::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(_) => {
                warn!("{}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}
