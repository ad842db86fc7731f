use ocfl_index::IndexError;
use ocfl_storage::StorageError;

/// Errors from queries.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad page size, cursor, sort, version, or path.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage could not be reached while opening content.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("index error: {0}")]
    Index(IndexError),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<IndexError> for QueryError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidCursor(_) | IndexError::InvalidSort(_) => {
                Self::InvalidArgument(err.to_string())
            }
            other => Self::Index(other),
        }
    }
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => Self::NotFound(path),
            StorageError::RootUnavailable { .. } => Self::Unavailable(err.to_string()),
            other => Self::Storage(other),
        }
    }
}

/// Result alias for queries.
pub type QueryResult<T> = Result<T, QueryError>;
