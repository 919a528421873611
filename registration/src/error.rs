//! HTTP error type.
//!
//! Bridges [`RegistrationError`] and HTTP responses. Every response body has the
//! shape `{"code": "...", "message": "..."}`, plus `"retryable": true` when the
//! identical request may succeed later.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use seatline_core::error::RegistrationError;
use serde::Serialize;
use std::fmt;

/// Error returned by every handler.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: String,
    retryable: bool,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create an error with an explicit status and code.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            retryable: false,
            source: None,
        }
    }

    /// Attach the underlying cause; logged, never returned to the client.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Mark the error as safe to retry.
    #[must_use]
    pub const fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// 409 Conflict with a specific code.
    #[must_use]
    pub fn conflict(code: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), code.to_string())
    }

    /// 422 Unprocessable Entity with a specific code.
    #[must_use]
    pub fn validation(code: &str, message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            code.to_string(),
        )
    }

    /// 408 Request Timeout.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::REQUEST_TIMEOUT,
            message.into(),
            "TIMEOUT".to_string(),
        )
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            retryable: self.retryable,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        let code = err.kind().to_ascii_uppercase();
        let message = err.to_string();
        match err {
            RegistrationError::NotFound { resource, id } => Self::not_found(resource, id),
            RegistrationError::RegistrationClosed(_)
            | RegistrationError::QuotaNotAvailable { .. }
            | RegistrationError::CapacityExhausted { .. }
            | RegistrationError::InvalidTransition { .. }
            | RegistrationError::DuplicateRequest => Self::conflict(&code, message),
            RegistrationError::InvalidQuantity
            | RegistrationError::ExceedsMaxPerTransaction { .. }
            | RegistrationError::FlowNotOffered { .. } => Self::validation(&code, message),
            RegistrationError::InvalidCursor(_) => {
                Self::new(StatusCode::BAD_REQUEST, message, code)
            }
            RegistrationError::WriteConflict(_) => {
                Self::conflict(&code, "Concurrent update, please retry").retryable()
            }
            RegistrationError::DeadlineExceeded => {
                Self::timeout("Registration did not complete in time").retryable()
            }
            RegistrationError::Internal(detail) => {
                Self::internal("An internal error occurred").with_source(anyhow::anyhow!(detail))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatline_core::error::ClosedReason;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_registration_error_mapping() {
        let cases = [
            (RegistrationError::instance_not_found("WS-01"), StatusCode::NOT_FOUND),
            (
                RegistrationError::RegistrationClosed(ClosedReason::Full),
                StatusCode::CONFLICT,
            ),
            (
                RegistrationError::ExceedsMaxPerTransaction { requested: 5, max: 4 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                RegistrationError::InvalidCursor("bad tag".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                RegistrationError::WriteConflict("version moved".to_string()),
                StatusCode::CONFLICT,
            ),
            (RegistrationError::DeadlineExceeded, StatusCode::REQUEST_TIMEOUT),
            (
                RegistrationError::Internal("pool closed".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let err = AppError::from(RegistrationError::Internal("password=hunter2".to_string()));
        assert_eq!(err.code(), "INTERNAL_SERVER_ERROR");
        assert!(!err.to_string().contains("hunter2"));
    }

    #[test]
    fn test_write_conflict_is_retryable() {
        let err = AppError::from(RegistrationError::WriteConflict("moved".to_string()));
        assert!(err.retryable);
        assert_eq!(err.code(), "WRITE_CONFLICT");
    }
}
