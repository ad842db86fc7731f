use std::path::PathBuf;

use ocfl_types::TypeError;

/// Errors from storage access.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The storage root directory does not exist or cannot be opened.
    #[error("storage root unavailable: {path}: {reason}")]
    RootUnavailable { path: PathBuf, reason: String },

    /// The directory exists but carries no OCFL storage root declaration.
    #[error("not an OCFL storage root: {0}")]
    NotAnOcflRoot(PathBuf),

    /// Enumeration failed partway through the storage tree.
    #[error("storage walk failed: {0}")]
    Walk(String),

    /// The inventory could not be read or does not describe a valid object.
    #[error("invalid inventory at {path}: {reason}")]
    InvalidInventory { path: String, reason: String },

    /// The inventory bytes do not match the sidecar digest.
    #[error("inventory digest mismatch at {path}: sidecar {expected}, computed {computed}")]
    SidecarMismatch {
        path: String,
        expected: String,
        computed: String,
    },

    /// The storage layout cannot map the id to a path.
    #[error("storage layout error: {0}")]
    Layout(String),

    /// A content or object path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid value: {0}")]
    Type(#[from] TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn inventory(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidInventory {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
