use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Failures surfaced by the chunk storage core and the gateways behind it.
#[derive(Debug, Error)]
pub enum ShareError {
    /// Declared size or type rejected by upload policy, or a malformed request.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A chunk write failed mid-sequence; resume from `index`.
    #[error("upload of chunk {index} failed: {source}")]
    ChunkUploadFailed {
        index: u32,
        #[source]
        source: Box<ShareError>,
    },

    #[error("object `{id}` is incomplete, missing chunk indices {missing:?}")]
    IncompleteObject { id: String, missing: Vec<u32> },

    #[error("object `{id}` declares {declared} bytes but its chunks hold {actual}")]
    SizeMismatch {
        id: String,
        declared: u64,
        actual: u64,
    },

    #[error("object `{0}` not found")]
    NotFound(String),

    #[error("permission denied for object `{0}`")]
    PermissionDenied(String),

    /// The anonymous principal attempted an owner-only operation.
    #[error("authentication required")]
    Unauthenticated,

    #[error("storage gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ShareResult<T> = Result<T, ShareError>;

impl ShareError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Connection-level database failures mean the store is unreachable, not that
/// the request was wrong.
impl From<sqlx::Error> for ShareError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                ShareError::GatewayUnavailable(err.to_string())
            }
            other => ShareError::Sqlx(other),
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ShareError> for AppError {
    fn from(err: ShareError) -> Self {
        let status = match &err {
            ShareError::Validation(_) => StatusCode::BAD_REQUEST,
            ShareError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ShareError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ShareError::NotFound(_) => StatusCode::NOT_FOUND,
            ShareError::IncompleteObject { .. } | ShareError::SizeMismatch { .. } => {
                StatusCode::CONFLICT
            }
            ShareError::ChunkUploadFailed { .. } => StatusCode::BAD_GATEWAY,
            ShareError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ShareError::Sqlx(_) | ShareError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", err);
        }
        AppError::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
