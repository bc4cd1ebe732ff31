use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Failures that can end an explain request.
///
/// Only `Validation` is the caller's fault; everything else is reported as a 500.
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("{0}")]
    Validation(String),

    // Both Sui providers failed; the message carries the primary provider's reason
    #[error("Failed to fetch transaction: {0}")]
    Fetch(String),

    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Upstream API returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid upstream response: {0}")]
    Decode(String),
}

impl ExplainError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExplainError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExplainError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error!(status = status.as_u16(), "Failed to explain transaction: {}", self);
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
