use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use ocfl_index::{IndexStore, LogConfig, PersistentIndex, ShardedIndex};
use ocfl_storage::{FsStorage, FsStorageConfig};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::{AppState, SharedState};

/// OCFL index server.
pub struct OcflIndexServer {
    config: ServerConfig,
}

impl OcflIndexServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the configured index: the log file if one is set, otherwise
    /// an empty in-memory index.
    pub fn open_index(&self) -> ServerResult<Arc<dyn IndexStore>> {
        Ok(match &self.config.index_file {
            Some(path) => Arc::new(PersistentIndex::open(path, LogConfig::default())?),
            None => Arc::new(ShardedIndex::new()),
        })
    }

    pub fn open_storage(&self) -> Arc<FsStorage> {
        Arc::new(FsStorage::new(
            self.config.storage_root.clone(),
            FsStorageConfig {
                read_sizes: self.config.read_sizes,
            },
        ))
    }

    /// Build the shared state over the configured storage root and index.
    pub fn build_state(&self) -> ServerResult<SharedState> {
        let index = self.open_index()?;
        Ok(Arc::new(AppState::new(index, self.open_storage(), &self.config)))
    }

    /// Serve until `shutdown` resolves, then stop accepting requests, end
    /// log streams, and cancel any running index job.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = self.build_state()?;
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            root = %state.root_path,
            "OCFL index server listening"
        );
        if self.config.index_on_start {
            state.jobs.start_index_all()?;
        }

        let token = state.shutdown.clone();
        let app = build_router(Arc::clone(&state));
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("shutdown signal received");
                token.cancel();
            })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));
        state.jobs.shutdown().await;
        result
    }
}
