use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use ocfl_index::{IndexStore, ObjectSort, Page};
use ocfl_jobs::JobStatus;
use ocfl_types::{IndexedObject, ObjectSummary, Spec};

use crate::error::{QueryError, QueryResult};
use crate::state::{self, StatePage, StateRequest};

/// Page size limits for listings.
#[derive(Debug, Clone, Copy)]
pub struct QueryConfig {
    /// Used when a request asks for page size 0.
    pub default_page_size: usize,
    /// Larger requests are clamped to this.
    pub max_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 1000,
            max_page_size: 1000,
        }
    }
}

/// Aggregate view of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub root_path: String,
    /// `None` until a full index run has completed.
    pub spec: Option<Spec>,
    pub description: String,
    pub object_count: usize,
    pub indexed_at: Option<DateTime<Utc>>,
}

/// [`Summary`] plus the latest jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub summary: Summary,
    pub jobs: JobStatus,
}

/// Answers queries from the index.
#[derive(Clone)]
pub struct QueryEngine {
    index: Arc<dyn IndexStore>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(index: Arc<dyn IndexStore>, config: QueryConfig) -> Self {
        Self { index, config }
    }

    pub fn config(&self) -> QueryConfig {
        self.config
    }

    /// Resolve a requested page size: 0 means the default, anything above
    /// the maximum is clamped, negative is rejected.
    pub fn page_size(&self, requested: i64) -> QueryResult<usize> {
        if requested < 0 {
            return Err(QueryError::InvalidArgument(format!(
                "page size must not be negative, got {requested}"
            )));
        }
        let max = self.config.max_page_size.max(1);
        Ok(match usize::try_from(requested).unwrap_or(usize::MAX) {
            0 => self.config.default_page_size.clamp(1, max),
            n => n.min(max),
        })
    }

    /// One page of object summaries. An empty cursor starts from the
    /// beginning.
    pub fn list_objects(
        &self,
        sort: ObjectSort,
        cursor: &str,
        page_size: i64,
    ) -> QueryResult<Page<ObjectSummary>> {
        let limit = self.page_size(page_size)?;
        let cursor = (!cursor.is_empty()).then_some(cursor);
        let page = self.index.scan(sort, cursor, limit)?;
        debug!(%sort, limit, returned = page.items.len(), "listed objects");
        Ok(page)
    }

    pub fn get_object(&self, id: &str) -> QueryResult<Arc<IndexedObject>> {
        if id.is_empty() {
            return Err(QueryError::InvalidArgument("object id is required".into()));
        }
        self.index
            .get(id)?
            .ok_or_else(|| QueryError::NotFound(format!("object {id}")))
    }

    /// List the logical state of one version at a base path.
    pub fn get_object_state(&self, request: &StateRequest) -> QueryResult<StatePage> {
        let object = self.get_object(&request.object_id)?;
        let limit = self.page_size(request.page_size)?;
        state::list(&object, request, limit)
    }

    pub fn summary(&self) -> QueryResult<Summary> {
        let info = self.index.root_info()?.unwrap_or_default();
        Ok(Summary {
            root_path: info.root_path,
            spec: info.spec,
            description: info.description,
            object_count: self.index.count()?,
            indexed_at: info.indexed_at,
        })
    }

    pub fn status(&self, jobs: JobStatus) -> QueryResult<Status> {
        Ok(Status {
            summary: self.summary()?,
            jobs,
        })
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine").field("config", &self.config).finish()
    }
}
