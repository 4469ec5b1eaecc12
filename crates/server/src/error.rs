//! The HTTP-facing failure taxonomy (§7): malformed input maps to 400,
//! everything else the router can't recover from maps to 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl From<friday_voice_core::CoreError> for ServerError {
    fn from(error: friday_voice_core::CoreError) -> Self {
        ServerError::BadRequest(error.to_string())
    }
}

impl From<friday_voice_pipeline::PipelineError> for ServerError {
    fn from(error: friday_voice_pipeline::PipelineError) -> Self {
        ServerError::Internal(error.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(error: serde_json::Error) -> Self {
        ServerError::Internal(format!("json serialisation failed: {error}"))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}
