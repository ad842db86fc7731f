use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ocfl_index::IndexStore;
use ocfl_jobs::JobManager;
use ocfl_query::{ContentResolver, QueryEngine};
use ocfl_storage::{ContentSource, InventoryReader, StorageWalker};

use crate::config::ServerConfig;

/// Shared application state.
pub struct AppState {
    pub query: QueryEngine,
    pub content: ContentResolver,
    pub jobs: JobManager,
    /// Cancelled when the server begins shutting down; ends log streams.
    pub shutdown: CancellationToken,
    pub root_path: String,
}

impl AppState {
    /// Wire the engine over one storage backend and one index.
    pub fn new<S>(index: Arc<dyn IndexStore>, storage: Arc<S>, config: &ServerConfig) -> Self
    where
        S: StorageWalker + InventoryReader + ContentSource + 'static,
    {
        let jobs = JobManager::new(
            Arc::clone(&index),
            storage.clone(),
            storage.clone(),
            config.job_config(),
        );
        Self::with_jobs(index, storage, jobs, config)
    }

    /// Like [`new`](Self::new) with an existing job manager.
    pub fn with_jobs<S>(
        index: Arc<dyn IndexStore>,
        storage: Arc<S>,
        jobs: JobManager,
        config: &ServerConfig,
    ) -> Self
    where
        S: StorageWalker + ContentSource + 'static,
    {
        Self {
            query: QueryEngine::new(Arc::clone(&index), config.query_config()),
            content: ContentResolver::new(index, storage.clone(), config.chunk_size),
            jobs,
            shutdown: CancellationToken::new(),
            root_path: storage.root_path(),
        }
    }
}

pub type SharedState = Arc<AppState>;
