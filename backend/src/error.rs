//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.
//!
//! Only errors raised before a stream starts reach this type. Failures inside a
//! running session (`StageFailure`, `ExportError`) travel through the event
//! stream instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// Each variant implements automatic conversion to HTTP responses via `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Submission is malformed or empty
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An attachment exceeds the upload limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Session with the given ID was not found (or has expired)
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but has no report to hand out
    #[error("Report unavailable: {0}")]
    ReportUnavailable(String),

    /// Settings update was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An attachment could not be turned into text
    #[error("Invalid request: {0}")]
    Extraction(#[from] crate::services::documents::ExtractionError),

    /// Rendering a stored report failed
    #[error("Export error: {0}")]
    Export(#[from] crate::report::ExportError),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ReportUnavailable(_) => StatusCode::CONFLICT,
            AppError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            AppError::Extraction(_) => StatusCode::BAD_REQUEST,
            AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::InvalidRequest("empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PayloadTooLarge("big".into()).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::SessionNotFound("s".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = AppError::InvalidRequest("query or attachment required".into())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 400);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("query or attachment required"));
    }
}
