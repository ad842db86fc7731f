use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use ocfl_index::IndexError;
use ocfl_jobs::JobError;
use ocfl_query::QueryError;
use ocfl_storage::StorageError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    AlreadyRunning(String),

    #[error("{0}")]
    ResourceExhausted(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl ServerError {
    /// Connect-style error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::AlreadyRunning(_) => "already_exists",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::Unavailable(_) => "unavailable",
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyRunning(_) => StatusCode::CONFLICT,
            Self::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<QueryError> for ServerError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound(m) => Self::NotFound(format!("not found: {m}")),
            QueryError::InvalidArgument(m) => Self::InvalidArgument(m),
            QueryError::Unavailable(m) => Self::Unavailable(m),
            QueryError::Index(e) => e.into(),
            QueryError::Storage(e) => e.into(),
        }
    }
}

impl From<JobError> for ServerError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::AlreadyRunning(_) => Self::AlreadyRunning(err.to_string()),
            JobError::InvalidArgument(m) => Self::InvalidArgument(m),
            JobError::TooManyFollowers(_) => Self::ResourceExhausted(err.to_string()),
            JobError::ShuttingDown | JobError::Cancelled => Self::Unavailable(err.to_string()),
            JobError::Storage(e) => e.into(),
            JobError::Index(e) => e.into(),
            JobError::Internal(m) => Self::Internal(m),
        }
    }
}

impl From<IndexError> for ServerError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidCursor(_) | IndexError::InvalidSort(_) => {
                Self::InvalidArgument(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => Self::NotFound(err.to_string()),
            StorageError::RootUnavailable { .. } | StorageError::NotAnOcflRoot(_) => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
