//! Error types for the Sync Reconciler server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::merge::MergeError;
use crate::upstream::UpstreamError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::Merge(e) => match e {
                MergeError::MalformedInput(_) => {
                    (StatusCode::BAD_REQUEST, "malformed_input", e.to_string())
                }
                MergeError::DuplicateKeyConflict { .. } => {
                    (StatusCode::CONFLICT, "duplicate_key", e.to_string())
                }
                MergeError::SchemaMismatch { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "schema_mismatch", e.to_string())
                }
            },
            AppError::Upstream(e) => {
                tracing::error!("Upstream error: {}", e);
                match e {
                    UpstreamError::RevisionConflict { .. } => (
                        StatusCode::CONFLICT,
                        "revision_conflict",
                        "The dataset changed during the sync, retry".to_string(),
                    ),
                    UpstreamError::Decode(_) => (
                        StatusCode::BAD_GATEWAY,
                        "upstream_decode_error",
                        "Upstream returned an unreadable dataset".to_string(),
                    ),
                    UpstreamError::Status { .. } | UpstreamError::Transport(_) => (
                        StatusCode::BAD_GATEWAY,
                        "upstream_error",
                        "Upstream store unavailable".to_string(),
                    ),
                }
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
