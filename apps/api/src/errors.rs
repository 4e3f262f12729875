use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::{retry_after_hint, LlmError};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// Upstream rate limit. `retry_after` holds the wait time parsed from the
    /// upstream message, e.g. `1m20.5s`.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<String> },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        if err.is_rate_limit() {
            AppError::RateLimited {
                retry_after: retry_after_hint(&err.to_string()),
            }
        } else {
            AppError::Llm(err.to_string())
        }
    }
}

impl AppError {
    /// The message shown to the caller. Rate limits carry the upstream wait time when known.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::UnprocessableEntity(msg) => msg.clone(),
            AppError::RateLimited {
                retry_after: Some(wait),
            } => format!("Rate limit exceeded. Please try again in {wait}."),
            AppError::RateLimited { retry_after: None } => {
                "Rate limit exceeded. Please try again later.".to_string()
            }
            AppError::Llm(_) => "The evaluation model could not be reached".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            AppError::UnprocessableEntity(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE_ENTITY")
            }
            AppError::RateLimited { .. } => {
                tracing::warn!("Upstream rate limit: {self}");
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED")
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (StatusCode::BAD_GATEWAY, "LLM_ERROR")
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.public_message()
            }
        }));

        (status, body).into_response()
    }
}
