/// Errors from index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A pagination cursor is malformed or belongs to a different query.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// An unknown sort field or direction was requested.
    #[error("invalid sort: {0}")]
    InvalidSort(String),

    /// A lock was poisoned by a panicking writer.
    #[error("index lock poisoned: {0}")]
    Poisoned(String),

    /// Record encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
