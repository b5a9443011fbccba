//! Error types for lodestar-daemon.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lodestar_channel::ChannelError;
use lodestar_registry::RegistryError;
use lodestar_storage::StorageError;
use lodestar_tasking::TaskingError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-facing errors.
///
/// Every channel, registry and queue failure converts into one of these
/// before a response is written. `Unauthorized` deliberately carries no
/// detail: an unknown session and a failed tag must be indistinguishable on
/// the wire.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication failed")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error")]
    Internal(String),
}

impl From<ChannelError> for ApiError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::InvalidHandshake(msg) => ApiError::BadRequest(msg),
            ChannelError::Malformed => ApiError::BadRequest("malformed request".to_string()),
            ChannelError::Unauthenticated => ApiError::Unauthorized,
            ChannelError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<TaskingError> for ApiError {
    fn from(err: TaskingError) -> Self {
        match err {
            TaskingError::UnknownAgent(id) => {
                ApiError::NotFound(format!("no active beacon {id}"))
            }
            TaskingError::UnknownTask(id) => ApiError::NotFound(format!("no task {id}")),
            TaskingError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if let ApiError::Internal(detail) = &self {
            tracing::error!(%detail, "request failed internally");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
