use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-object errors kept on a job record; later ones are only counted.
pub const MAX_RECORDED_ERRORS: usize = 1000;

/// Unique identifier for an indexing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// A new time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// What a job indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Every object in the storage root, with reconciliation.
    All,
    /// An explicit set of object ids.
    Ids,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Ids => write!(f, "ids"),
        }
    }
}

/// Lifecycle state of a job: `Pending -> Running -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    /// Every target was processed; some may have per-object errors.
    Completed,
    /// The run stopped early; see [`JobRecord::failure`].
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// An object that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectError {
    /// Object id when known, otherwise its root path.
    pub target: String,
    pub message: String,
}

/// Progress counters for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    /// Object roots discovered (full runs) or ids requested (targeted runs).
    pub found: u64,
    pub indexed: u64,
    /// Skipped because the inventory digest had not changed.
    pub unchanged: u64,
    pub removed: u64,
    pub failed: u64,
}

/// State of one indexing job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub counters: JobCounters,
    /// The first [`MAX_RECORDED_ERRORS`] per-object errors.
    pub errors: Vec<ObjectError>,
    /// Why the job failed, for `Failed` jobs.
    pub failure: Option<String>,
}

impl JobRecord {
    pub fn new(kind: JobKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            kind,
            state: JobState::Pending,
            created_at,
            started_at: None,
            ended_at: None,
            counters: JobCounters::default(),
            errors: Vec::new(),
            failure: None,
        }
    }

    pub(crate) fn record_error(&mut self, target: impl Into<String>, message: impl Into<String>) {
        self.counters.failed += 1;
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(ObjectError {
                target: target.into(),
                message: message.into(),
            });
        }
    }
}

/// Result of asking for a full run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAllTrigger {
    /// `false` when a full run was already active and is returned instead.
    pub started: bool,
    pub job: JobRecord,
}

/// What happened to one id in a targeted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum IdOutcome {
    /// Parsed and stored.
    Indexed,
    /// Already indexed from the same inventory.
    Unchanged,
    /// Gone from storage; its index entry was deleted.
    Removed,
    /// Neither in storage nor in the index.
    NotFound,
    /// Could not be indexed; the previous index entry, if any, is kept.
    Failed(String),
}

impl IdOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Indexed | Self::Unchanged)
    }
}

/// Outcome for one requested id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdResult {
    pub id: String,
    pub outcome: IdOutcome,
}

/// The latest job of each kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStatus {
    pub all: Option<JobRecord>,
    pub ids: Option<JobRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_predicates() {
        assert!(JobState::Pending.is_active());
        assert!(JobState::Running.is_active());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Failed.is_active());
    }

    #[test]
    fn job_ids_are_time_ordered() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert!(a.0 < b.0);
    }

    #[test]
    fn error_list_is_bounded() {
        let mut job = JobRecord::new(JobKind::All, Utc::now());
        for i in 0..MAX_RECORDED_ERRORS + 5 {
            job.record_error(format!("obj{i}"), "bad");
        }
        assert_eq!(job.errors.len(), MAX_RECORDED_ERRORS);
        assert_eq!(job.counters.failed, (MAX_RECORDED_ERRORS + 5) as u64);
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_string(&IdOutcome::Removed).unwrap();
        assert_eq!(json, r#"{"status":"removed"}"#);
        let json = serde_json::to_string(&IdOutcome::Failed("bad".into())).unwrap();
        assert_eq!(json, r#"{"status":"failed","detail":"bad"}"#);
    }
}
