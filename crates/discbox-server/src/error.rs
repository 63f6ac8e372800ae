//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code. Internal
//! errors are logged with full detail but only a generic message reaches
//! the wire.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use discbox::DiscboxError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] DiscboxError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::Core(DiscboxError::InvalidUrl(message)) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),

            ServerError::Core(DiscboxError::JobConflict { active_job_id }) => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "A job is already running",
                    "activeJobId": active_job_id,
                })),
            )
                .into_response(),

            ServerError::Core(DiscboxError::JobNotFound(id)) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("Job {id} not found") })),
            )
                .into_response(),

            ServerError::Core(DiscboxError::JobNotFinished(id)) => (
                StatusCode::CONFLICT,
                Json(json!({ "error": format!("Job {id} is not finished") })),
            )
                .into_response(),

            ServerError::Core(e) => {
                error!(error = %e, "core error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }

            ServerError::Internal(message) => {
                error!(message = %message, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
