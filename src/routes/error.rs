use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::engine::EngineError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

/// Error body: `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorInfo {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Engine(err) => {
                let status = match &err {
                    EngineError::InvalidWindow { .. }
                    | EngineError::InvalidFormat(_)
                    | EngineError::InvalidEntry { .. }
                    | EngineError::InvalidMaxAge => StatusCode::BAD_REQUEST,
                    EngineError::ChannelResolution { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    EngineError::QueryFailure { .. } => StatusCode::BAD_GATEWAY,
                    EngineError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                };
                if status.is_server_error() {
                    tracing::warn!(error = %err, "Engine error");
                }
                (status, err.kind(), err.to_string())
            }
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
