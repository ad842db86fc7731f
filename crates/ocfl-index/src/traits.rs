use std::collections::BTreeMap;
use std::sync::Arc;

use ocfl_types::{ContentLocation, Digest, IndexedObject, ObjectSummary, StorageRootInfo};

use crate::error::IndexResult;
use crate::sort::ObjectSort;

/// One page of a cursor-paginated listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` when this is the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// The authoritative mapping from object id to indexed metadata and from
/// content digest to storage location.
///
/// Implementations must satisfy:
/// - Every operation is atomic with respect to a single object id. A reader
///   sees either the previous or the new version of an object, never a mix.
/// - Writes to one id do not block reads of unrelated ids for longer than a
///   shard-level lock hold.
/// - A scan cursor resumes strictly after the position it encodes, under the
///   sort it was issued for.
pub trait IndexStore: Send + Sync {
    /// Insert or replace the object with the same id.
    fn upsert(&self, object: IndexedObject) -> IndexResult<()>;

    /// Remove an object. Returns `true` if it was present.
    fn delete(&self, id: &str) -> IndexResult<bool>;

    /// Look up one object.
    fn get(&self, id: &str) -> IndexResult<Option<Arc<IndexedObject>>>;

    /// List object summaries in `sort` order, resuming after `cursor`.
    ///
    /// Fails with [`IndexError::InvalidCursor`](crate::IndexError::InvalidCursor)
    /// if the cursor is malformed or was issued for another sort.
    fn scan(
        &self,
        sort: ObjectSort,
        cursor: Option<&str>,
        limit: usize,
    ) -> IndexResult<Page<ObjectSummary>>;

    /// Find where the bytes for a digest are stored.
    fn resolve_digest(&self, digest: &Digest) -> IndexResult<Option<ContentLocation>>;

    /// Every indexed id with its object root path.
    fn object_roots(&self) -> IndexResult<BTreeMap<String, String>>;

    /// Number of indexed objects.
    fn count(&self) -> IndexResult<usize>;

    /// Metadata recorded by the last completed full index run.
    fn root_info(&self) -> IndexResult<Option<StorageRootInfo>>;

    /// Replace the storage root metadata.
    fn set_root_info(&self, info: StorageRootInfo) -> IndexResult<()>;

    /// Reclaim space in durable backends. No-op by default.
    fn compact(&self) -> IndexResult<()> {
        Ok(())
    }
}
