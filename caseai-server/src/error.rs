//! HTTP error mapping for caseai-server
//!
//! Handlers return `ApiResult<T>`; the common error taxonomy maps onto status
//! codes here so every endpoint reports failures the same way.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use caseai_common::Error;
use serde::Serialize;
use tracing::{error, warn};

/// Convenience Result type for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error body: `{"error": ..., "details": ...}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Handler error wrapping the common error type
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

/// Malformed or incomplete JSON bodies are validation errors, not axum's
/// plain-text 4xx
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Synthesis(_) | Error::Transcription(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Storage(_)
            | Error::NotificationChannel(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match &self.0 {
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::Storage(_) => "storage_error",
            Error::NotificationChannel(_) => "notification_channel_error",
            Error::Synthesis(_) => "synthesis_error",
            Error::Transcription(_) => "transcription_error",
            Error::Timeout(_) => "timeout",
            Error::ProviderUnavailable(_) => "provider_unavailable",
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        let body = ErrorBody {
            error: self.label().to_string(),
            details: Some(self.0.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
