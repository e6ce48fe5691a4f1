//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use lhub_models::ValidationError;
use lhub_pipeline::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Body of every failed processing response.
pub const PROCESSING_FAILED_MESSAGE: &str = "Error processing video";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Oversize uploads share one status whichever layer catches them.
    fn is_too_large(&self) -> bool {
        matches!(
            self,
            ApiError::PayloadTooLarge(_)
                | ApiError::Validation(ValidationError::TooLarge { .. })
                | ApiError::Pipeline(PipelineError::Validation(ValidationError::TooLarge { .. }))
        )
    }

    fn status_code(&self) -> StatusCode {
        if self.is_too_large() {
            return StatusCode::PAYLOAD_TOO_LARGE;
        }
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Pipeline(e) if e.is_caller_visible() => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller.
    fn public_message(&self) -> String {
        match self {
            ApiError::Pipeline(e) if e.is_caller_visible() => e.to_string(),
            ApiError::Pipeline(_) | ApiError::Internal(_) => PROCESSING_FAILED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
