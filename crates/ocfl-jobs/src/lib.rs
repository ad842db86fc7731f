//! Indexing job manager for the OCFL index.
//!
//! A [`JobManager`] owns the lifecycle of indexing runs against one storage
//! root and one [`IndexStore`](ocfl_index::IndexStore):
//!
//! - **Full runs** ([`JobManager::start_index_all`]) walk the whole root in
//!   the background, upsert every object found, and delete index entries
//!   for objects that are gone. Only one full run is active at a time; a
//!   trigger while one is running returns the running job.
//! - **Targeted runs** ([`JobManager::index_ids`]) re-index a set of ids and
//!   return one outcome per id when they are all done.
//!
//! Both kinds write through the same [`Reconciler`](reconcile::Reconciler)
//! path. Progress is published as [`LogEntry`] values on a [`LogHub`]; any
//! number of followers (up to a limit) can subscribe without slowing the
//! jobs down.
//!
//! # Key Types
//!
//! - [`JobManager`] / [`JobManagerConfig`]
//! - [`JobRecord`] / [`JobState`] / [`JobKind`] / [`JobId`]
//! - [`IdResult`] / [`IdOutcome`]: per-id result of a targeted run
//! - [`LogHub`] / [`LogEntry`] / [`LogSubscription`]
//! - [`Clock`]: injectable time source

pub mod clock;
pub mod error;
pub mod job;
pub mod logs;
pub mod manager;
pub mod reconcile;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{JobError, JobResult};
pub use job::{
    IdOutcome, IdResult, IndexAllTrigger, JobCounters, JobId, JobKind, JobRecord, JobState,
    JobStatus, ObjectError,
};
pub use logs::{LogEntry, LogHub, LogHubConfig, LogSubscription, Severity};
pub use manager::{JobManager, JobManagerConfig};
