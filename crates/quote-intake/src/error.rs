use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::quote_requests::{error_response, QuoteRequestError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Process-level failures surfaced by the binaries.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("quote request error: {0}")]
    QuoteRequest(#[from] QuoteRequestError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::QuoteRequest(err) => err.status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::QuoteRequest(err) => error_response(err),
            other => {
                tracing::error!(error = %other, "request failed outside the quote workflow");
                let body = Json(json!({ "error": "internal error" }));
                (other.status_code(), body).into_response()
            }
        }
    }
}
