//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use herald_core::{HandlerError, SignatureError};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::metrics;

/// API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing user header: {0}")]
    MissingUser(String),

    #[error("Access denied to channel: {0}")]
    Forbidden(String),

    #[error("Too many event arguments: {count} exceeds {limit}")]
    TooManyArgs { count: usize, limit: usize },

    #[error("{0}")]
    Signature(#[from] SignatureError),

    #[error("{0}")]
    Handler(#[from] HandlerError),
}

impl ApiError {
    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingUser(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::TooManyArgs { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Signature(SignatureError::InvalidSocketId(_)) => StatusCode::BAD_REQUEST,
            Self::Signature(SignatureError::InvalidKey) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Handler(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingUser(_) => "MISSING_USER",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::TooManyArgs { .. } => "TOO_MANY_ARGUMENTS",
            Self::Signature(SignatureError::InvalidSocketId(_)) => "INVALID_SOCKET_ID",
            Self::Signature(SignatureError::InvalidKey) => "SIGNING_FAILED",
            Self::Handler(_) => "HANDLER_FAILED",
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        warn!(code, status = status.as_u16(), error = %self, "Request rejected");
        metrics::record_error(code);

        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::MissingUser("x-user-id".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("private-user-1".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(SignatureError::InvalidSocketId("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(HandlerError::MissingArgument { index: 0 }).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::TooManyArgs { count: 9, limit: 8 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
