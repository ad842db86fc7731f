use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ocfl_index::IndexStore;
use ocfl_storage::{InventoryReader, ObjectRoot, StorageError, StorageWalker};
use ocfl_types::StorageRootInfo;

use crate::clock::{Clock, SystemClock};
use crate::error::{JobError, JobResult};
use crate::job::{
    IdOutcome, IdResult, IndexAllTrigger, JobId, JobKind, JobRecord, JobState, JobStatus,
};
use crate::logs::{LogHub, LogHubConfig, LogSubscription, Severity};
use crate::reconcile::{Loaded, Reconciler};

/// Discovered object roots buffered between the walker and the parsers.
const WALK_BUFFER: usize = 256;

/// Configuration for the [`JobManager`].
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Inventories parsed at once.
    pub parse_concurrency: usize,
    pub hub: LogHubConfig,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            parse_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            hub: LogHubConfig::default(),
        }
    }
}

#[derive(Default)]
struct Slots {
    all: Option<JobRecord>,
    ids: Option<JobRecord>,
}

impl Slots {
    fn get_mut(&mut self, kind: JobKind) -> &mut Option<JobRecord> {
        match kind {
            JobKind::All => &mut self.all,
            JobKind::Ids => &mut self.ids,
        }
    }
}

struct Inner {
    index: Arc<dyn IndexStore>,
    walker: Arc<dyn StorageWalker>,
    reconciler: Arc<Reconciler>,
    clock: Arc<dyn Clock>,
    hub: LogHub,
    config: JobManagerConfig,
    slots: Mutex<Slots>,
    all_task: Mutex<Option<JoinHandle<()>>>,
    all_finished: Notify,
    shutdown: CancellationToken,
}

/// Runs indexing jobs against one storage root and one index.
///
/// Cheap to clone; clones share the same jobs and log hub.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    pub fn new(
        index: Arc<dyn IndexStore>,
        walker: Arc<dyn StorageWalker>,
        reader: Arc<dyn InventoryReader>,
        config: JobManagerConfig,
    ) -> Self {
        Self::with_clock(index, walker, reader, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        index: Arc<dyn IndexStore>,
        walker: Arc<dyn StorageWalker>,
        reader: Arc<dyn InventoryReader>,
        config: JobManagerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&index),
            Arc::clone(&walker),
            reader,
        ));
        let hub = LogHub::new(config.hub.clone(), Arc::clone(&clock));
        Self {
            inner: Arc::new(Inner {
                index,
                walker,
                reconciler,
                clock,
                hub,
                config,
                slots: Mutex::new(Slots::default()),
                all_task: Mutex::new(None),
                all_finished: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Start a background run over the whole storage root.
    ///
    /// If a full run is already pending or running, that job is returned
    /// with `started == false` and no new run begins.
    pub fn start_index_all(&self) -> JobResult<IndexAllTrigger> {
        self.inner.ensure_open()?;
        let mut slots = self.inner.lock_slots();
        if let Some(job) = slots.all.as_ref().filter(|job| job.state.is_active()) {
            debug!(job_id = %job.id, "full index already running");
            return Ok(IndexAllTrigger {
                started: false,
                job: job.clone(),
            });
        }
        let job = JobRecord::new(JobKind::All, self.inner.clock.now());
        slots.all = Some(job.clone());
        drop(slots);

        let inner = Arc::clone(&self.inner);
        let job_id = job.id;
        let handle = tokio::spawn(async move { inner.run_all(job_id).await });
        *self
            .inner
            .all_task
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(IndexAllTrigger { started: true, job })
    }

    /// Like [`start_index_all`](Self::start_index_all), but an active run is
    /// an error instead of being returned.
    pub fn start_index_all_exclusive(&self) -> JobResult<JobRecord> {
        let trigger = self.start_index_all()?;
        if trigger.started {
            Ok(trigger.job)
        } else {
            Err(JobError::AlreadyRunning(trigger.job.id))
        }
    }

    /// Wait until no full run is active and return the latest one.
    pub async fn wait_index_all(&self) -> Option<JobRecord> {
        loop {
            let notified = self.inner.all_finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let current = self.inner.lock_slots().all.clone();
            match current {
                Some(job) if job.state.is_active() => notified.await,
                other => return other,
            }
        }
    }

    /// Re-index the given ids and report one outcome per distinct id, in
    /// the order first given.
    ///
    /// Runs alongside an active full run; both write through the same path.
    pub async fn index_ids(&self, ids: Vec<String>) -> JobResult<Vec<IdResult>> {
        self.inner.ensure_open()?;
        if ids.is_empty() {
            return Err(JobError::InvalidArgument(
                "at least one object id is required".into(),
            ));
        }
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(JobError::InvalidArgument("object id must not be empty".into()));
        }
        let mut distinct = HashSet::new();
        let ids: Vec<String> = ids.into_iter().filter(|id| distinct.insert(id.clone())).collect();

        let now = self.inner.clock.now();
        let mut job = JobRecord::new(JobKind::Ids, now);
        job.state = JobState::Running;
        job.started_at = Some(now);
        job.counters.found = ids.len() as u64;
        let job_id = job.id;
        self.inner.lock_slots().ids = Some(job);
        self.inner.log(
            Severity::Info,
            Some(job_id),
            format!("indexing {} object id(s)", ids.len()),
        );

        match self.inner.run_ids(job_id, &ids).await {
            Ok(results) => {
                self.inner.finish(JobKind::Ids, job_id, Ok(()));
                Ok(results)
            }
            Err(err) => {
                self.inner.finish(JobKind::Ids, job_id, Err(err.to_string()));
                Err(err)
            }
        }
    }

    /// The latest job of each kind.
    pub fn status(&self) -> JobStatus {
        let slots = self.inner.lock_slots();
        JobStatus {
            all: slots.all.clone(),
            ids: slots.ids.clone(),
        }
    }

    pub fn subscribe_logs(&self) -> JobResult<LogSubscription> {
        self.inner.hub.subscribe()
    }

    pub fn log_hub(&self) -> &LogHub {
        &self.inner.hub
    }

    pub fn index(&self) -> &Arc<dyn IndexStore> {
        &self.inner.index
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting jobs, cancel the active full run, and wait for it.
    ///
    /// Upserts already committed by the cancelled run stay in the index.
    pub async fn shutdown(&self) {
        info!("job manager shutting down");
        self.inner.shutdown.cancel();
        let handle = self
            .inner
            .all_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "full index task did not exit cleanly");
            }
        }
    }
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("root", &self.inner.walker.root_path())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Progress of one full run.
#[derive(Default)]
struct Sweep {
    /// Indexed ids not yet seen in storage during this run.
    remaining: HashSet<String>,
    /// Indexed root path to id, from before the run.
    by_path: HashMap<String, String>,
}

impl Inner {
    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_open(&self) -> JobResult<()> {
        if self.shutdown.is_cancelled() {
            Err(JobError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn update(&self, kind: JobKind, id: JobId, f: impl FnOnce(&mut JobRecord)) {
        let mut slots = self.lock_slots();
        if let Some(job) = slots.get_mut(kind).as_mut().filter(|job| job.id == id) {
            f(job);
        }
    }

    fn log(&self, severity: Severity, job_id: Option<JobId>, message: String) {
        let job = job_id.map(|id| id.to_string()).unwrap_or_default();
        match severity {
            Severity::Debug => debug!(job_id = %job, "{message}"),
            Severity::Info => info!(job_id = %job, "{message}"),
            Severity::Warn => warn!(job_id = %job, "{message}"),
            Severity::Error => error!(job_id = %job, "{message}"),
        }
        self.hub.publish(severity, message, job_id);
    }

    fn finish(&self, kind: JobKind, id: JobId, result: Result<(), String>) {
        let now = self.clock.now();
        let mut summary = None;
        self.update(kind, id, |job| {
            job.ended_at = Some(now);
            match &result {
                Ok(()) => job.state = JobState::Completed,
                Err(reason) => {
                    job.state = JobState::Failed;
                    job.failure = Some(reason.clone());
                }
            }
            summary = Some(job.counters);
        });
        let counters = summary.unwrap_or_default();
        match result {
            Ok(()) => self.log(
                Severity::Info,
                Some(id),
                format!(
                    "{kind} job completed: {} found, {} indexed, {} unchanged, {} removed, {} failed",
                    counters.found,
                    counters.indexed,
                    counters.unchanged,
                    counters.removed,
                    counters.failed
                ),
            ),
            Err(reason) => self.log(Severity::Error, Some(id), format!("{kind} job failed: {reason}")),
        }
        if kind == JobKind::All {
            self.all_finished.notify_waiters();
        }
    }

    async fn run_all(self: Arc<Self>, id: JobId) {
        let result = self.index_all(id).await.map_err(|err| err.to_string());
        self.finish(JobKind::All, id, result);
    }

    async fn index_all(&self, id: JobId) -> JobResult<()> {
        let started = self.clock.now();
        self.update(JobKind::All, id, |job| {
            job.state = JobState::Running;
            job.started_at = Some(started);
        });
        let root_path = self.walker.root_path();
        self.log(
            Severity::Info,
            Some(id),
            format!("indexing storage root {root_path}"),
        );

        let walker = Arc::clone(&self.walker);
        let description = tokio::task::spawn_blocking(move || walker.describe())
            .await
            .map_err(|e| JobError::Internal(format!("describe task failed: {e}")))??;

        let indexed = self.index.object_roots()?;
        let mut sweep = Sweep {
            remaining: indexed.keys().cloned().collect(),
            by_path: indexed.into_iter().map(|(id, path)| (path, id)).collect(),
        };

        let (tx, mut rx) = mpsc::channel(WALK_BUFFER);
        let walker = Arc::clone(&self.walker);
        let walk_task = tokio::task::spawn_blocking(move || {
            let roots = match walker.walk() {
                Ok(roots) => roots,
                Err(err) => {
                    let _ = tx.blocking_send(Err(err));
                    return;
                }
            };
            for item in roots {
                let stop = item.is_err();
                if tx.blocking_send(item).is_err() || stop {
                    return;
                }
            }
        });

        let concurrency = self.config.parse_concurrency.max(1);
        let mut workers: JoinSet<(ObjectRoot, JobResult<Loaded>)> = JoinSet::new();
        let mut walk_done = false;
        let mut walk_error: Option<StorageError> = None;

        while !(walk_done && workers.is_empty()) {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    workers.abort_all();
                    rx.close();
                    return Err(JobError::Cancelled);
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    let (root, loaded) = joined
                        .map_err(|e| JobError::Internal(format!("index worker failed: {e}")))?;
                    self.record(id, &mut sweep, root, loaded)?;
                }
                item = rx.recv(), if !walk_done && workers.len() < concurrency => match item {
                    Some(Ok(root)) => {
                        self.update(JobKind::All, id, |job| job.counters.found += 1);
                        let previous = sweep.by_path.get(&root.path).cloned();
                        let reconciler = Arc::clone(&self.reconciler);
                        workers.spawn_blocking(move || {
                            let loaded = reconciler.load(&root, previous.as_deref());
                            (root, loaded)
                        });
                    }
                    Some(Err(err)) => {
                        walk_error = Some(err);
                        walk_done = true;
                    }
                    None => walk_done = true,
                },
            }
        }
        drop(rx);
        if let Err(err) = walk_task.await {
            warn!(error = %err, "storage walk task did not exit cleanly");
        }
        if let Some(err) = walk_error {
            return Err(err.into());
        }
        if self.shutdown.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let stale: BTreeSet<String> = sweep.remaining.into_iter().collect();
        for stale_id in stale {
            if self.index.delete(&stale_id)? {
                self.update(JobKind::All, id, |job| job.counters.removed += 1);
                self.log(
                    Severity::Info,
                    Some(id),
                    format!("removed {stale_id}: no longer in storage"),
                );
            }
        }

        self.index.set_root_info(StorageRootInfo {
            root_path,
            spec: Some(description.spec),
            description: description.description,
            indexed_at: Some(self.clock.now()),
        })?;
        if let Err(err) = self.index.compact() {
            self.log(
                Severity::Warn,
                Some(id),
                format!("index compaction failed: {err}"),
            );
        }
        Ok(())
    }

    /// Apply one loaded object root to the index and the job counters.
    /// Only index failures are returned.
    fn record(
        &self,
        id: JobId,
        sweep: &mut Sweep,
        root: ObjectRoot,
        loaded: JobResult<Loaded>,
    ) -> JobResult<()> {
        match loaded {
            Ok(Loaded::Unchanged(object_id)) => {
                sweep.remaining.remove(&object_id);
                self.update(JobKind::All, id, |job| job.counters.unchanged += 1);
            }
            Ok(Loaded::Parsed(object)) => {
                let object_id = object.id().to_string();
                let head = object.head().vnum;
                self.reconciler.store(object)?;
                sweep.remaining.remove(&object_id);
                self.update(JobKind::All, id, |job| job.counters.indexed += 1);
                self.log(
                    Severity::Debug,
                    Some(id),
                    format!("indexed {object_id} ({head}) from {}", root.path),
                );
            }
            Err(JobError::Storage(err)) => {
                // The previous entry at this path, if any, stays indexed.
                let target = match sweep.by_path.get(&root.path) {
                    Some(previous) => {
                        sweep.remaining.remove(previous);
                        previous.clone()
                    }
                    None => root.path.clone(),
                };
                let message = err.to_string();
                self.log(
                    Severity::Warn,
                    Some(id),
                    format!("failed to index {target}: {message}"),
                );
                self.update(JobKind::All, id, |job| job.record_error(target, message));
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    async fn run_ids(&self, job_id: JobId, ids: &[String]) -> JobResult<Vec<IdResult>> {
        let concurrency = self.config.parse_concurrency.max(1);
        let mut outcomes: Vec<Option<IdOutcome>> = vec![None; ids.len()];
        let mut workers: JoinSet<(usize, JobResult<IdOutcome>)> = JoinSet::new();
        let mut next = 0;

        while next < ids.len() || !workers.is_empty() {
            if next < ids.len() && workers.len() < concurrency {
                let reconciler = Arc::clone(&self.reconciler);
                let id = ids[next].clone();
                let pos = next;
                workers.spawn_blocking(move || (pos, reconciler.index_id(&id)));
                next += 1;
                continue;
            }
            let joined = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    workers.abort_all();
                    return Err(JobError::Cancelled);
                }
                joined = workers.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };
            let (pos, outcome) =
                joined.map_err(|e| JobError::Internal(format!("index worker failed: {e}")))?;
            let outcome = outcome?;
            self.record_outcome(job_id, &ids[pos], &outcome);
            outcomes[pos] = Some(outcome);
        }

        ids.iter()
            .zip(outcomes)
            .map(|(id, outcome)| {
                outcome
                    .map(|outcome| IdResult {
                        id: id.clone(),
                        outcome,
                    })
                    .ok_or_else(|| JobError::Internal(format!("no outcome for {id}")))
            })
            .collect()
    }

    fn record_outcome(&self, job_id: JobId, id: &str, outcome: &IdOutcome) {
        let (severity, message) = match outcome {
            IdOutcome::Indexed => (Severity::Info, format!("indexed {id}")),
            IdOutcome::Unchanged => (Severity::Debug, format!("{id} unchanged")),
            IdOutcome::Removed => (Severity::Info, format!("removed {id}: no longer in storage")),
            IdOutcome::NotFound => (Severity::Warn, format!("{id} not found in storage")),
            IdOutcome::Failed(reason) => (Severity::Warn, format!("failed to index {id}: {reason}")),
        };
        self.update(JobKind::Ids, job_id, |job| match outcome {
            IdOutcome::Indexed => job.counters.indexed += 1,
            IdOutcome::Unchanged => job.counters.unchanged += 1,
            IdOutcome::Removed => job.counters.removed += 1,
            IdOutcome::NotFound => {}
            IdOutcome::Failed(reason) => job.record_error(id, reason.clone()),
        });
        self.log(severity, Some(job_id), message);
    }
}
