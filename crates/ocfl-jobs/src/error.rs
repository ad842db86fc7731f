use ocfl_index::IndexError;
use ocfl_storage::StorageError;

use crate::job::JobId;

/// Errors from job operations.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// A full run is active and the caller asked not to coalesce.
    #[error("an indexing run is already active: {0}")]
    AlreadyRunning(JobId),

    /// The manager is shutting down and accepts no new work.
    #[error("job manager is shutting down")]
    ShuttingDown,

    /// The run was interrupted by shutdown.
    #[error("cancelled: server shutting down")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The log follower limit has been reached.
    #[error("too many log followers (limit {0})")]
    TooManyFollowers(usize),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for job operations.
pub type JobResult<T> = Result<T, JobError>;
