//! API error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tessera_users::{ErrorKind, UserError};
use thiserror::Error;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request failed validation and never reached the service.
    #[error("{0}")]
    Validation(String),

    /// The request carries no usable bearer token.
    #[error("{0}")]
    Unauthorized(String),

    /// The service failed.
    #[error(transparent)]
    User(#[from] UserError),
}

/// Error body: `{"error": "...", "kind": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human readable message.
    pub error: String,
    /// Stable classification.
    pub kind: &'static str,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::User(err) => status_for(err.kind()),
        }
    }

    /// Stable classification of this error.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_failed",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::User(err) => err.kind().as_str(),
        }
    }
}

/// Maps a service error kind to its HTTP status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RegistrationFailed
        | ErrorKind::ConfirmationFailed
        | ErrorKind::ResendFailed => StatusCode::BAD_REQUEST,
        ErrorKind::AuthenticationFailed | ErrorKind::InvalidToken | ErrorKind::KeyNotFound => {
            StatusCode::UNAUTHORIZED
        },
        ErrorKind::UserNotConfirmed => StatusCode::FORBIDDEN,
        ErrorKind::ProfileIncomplete => StatusCode::NOT_FOUND,
        ErrorKind::LocalStoreConflict => StatusCode::CONFLICT,
        ErrorKind::ExistenceCheckFailed | ErrorKind::ProfileUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::KeySetUnavailable | ErrorKind::LocalStoreUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        },
        ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(kind = self.kind(), error = %self, "Request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
