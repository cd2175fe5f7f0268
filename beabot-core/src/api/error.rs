//! HTTP error responses

use crate::error::{Error, PlatformError, ResolutionError, ValidationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Platform refused the action (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request conflicts with session state (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream failure: platform or download (502)
    #[error("Upstream error: {0}")]
    BadGateway(String),

    /// Resolution timed out (504)
    #[error("Timed out: {0}")]
    GatewayTimeout(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::Validation(ref v) => match v {
                ValidationError::QueueFull { .. }
                | ValidationError::SessionActive
                | ValidationError::NotConnected => ApiError::Conflict(message),
                ValidationError::IndexOutOfRange { .. }
                | ValidationError::EmptyQueue
                | ValidationError::InvalidInput(_) => ApiError::BadRequest(message),
            },
            Error::Resolution(ref r) => match r {
                ResolutionError::NotFound(_) => ApiError::NotFound(message),
                ResolutionError::Download(_) => ApiError::BadGateway(message),
                ResolutionError::Timeout(_) => ApiError::GatewayTimeout(message),
            },
            Error::Platform(ref p) => match p {
                PlatformError::NotFound(_) => ApiError::NotFound(message),
                PlatformError::Forbidden(_) => ApiError::Forbidden(message),
                _ => ApiError::BadGateway(message),
            },
            Error::TrackRefused { .. } | Error::Resource(_) => ApiError::BadGateway(message),
            Error::SessionClosed => ApiError::Conflict(message),
            Error::Common(ref c) => match c {
                beabot_common::Error::NotFound(_) => ApiError::NotFound(message),
                beabot_common::Error::InvalidInput(_) => ApiError::BadRequest(message),
                _ => ApiError::Internal(message),
            },
            Error::Io(_) => ApiError::Internal(message),
        }
    }
}

impl From<ResolutionError> for ApiError {
    fn from(err: ResolutionError) -> Self {
        Error::from(err).into()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Error::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::GatewayTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience type for handler results
pub type ApiResult<T> = Result<T, ApiError>;
