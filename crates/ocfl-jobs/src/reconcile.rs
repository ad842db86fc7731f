//! The write path shared by full and targeted index runs.

use std::sync::Arc;

use tracing::{debug, trace};

use ocfl_index::{IndexResult, IndexStore};
use ocfl_storage::{InventoryReader, Located, ObjectRoot, StorageResult, StorageWalker};
use ocfl_types::IndexedObject;

use crate::error::JobResult;
use crate::job::IdOutcome;

/// An object root after reading its inventory.
#[derive(Debug)]
pub enum Loaded {
    /// The sidecar digest matches the indexed entry for this id.
    Unchanged(String),
    /// The inventory was parsed and needs to be stored.
    Parsed(IndexedObject),
}

/// Reads objects from storage and writes them to the index.
pub struct Reconciler {
    index: Arc<dyn IndexStore>,
    walker: Arc<dyn StorageWalker>,
    reader: Arc<dyn InventoryReader>,
}

impl Reconciler {
    pub fn new(
        index: Arc<dyn IndexStore>,
        walker: Arc<dyn StorageWalker>,
        reader: Arc<dyn InventoryReader>,
    ) -> Self {
        Self {
            index,
            walker,
            reader,
        }
    }

    /// Read the object at `root`.
    ///
    /// `previous` is the id currently indexed at that root path, if any. When
    /// its recorded inventory digest equals the sidecar digest the inventory
    /// is not parsed again.
    pub fn load(&self, root: &ObjectRoot, previous: Option<&str>) -> JobResult<Loaded> {
        if let Some(id) = previous {
            if let Some(existing) = self.index.get(id)? {
                if existing.root_path() == root.path {
                    if let Some(indexed) = existing.inventory_digest() {
                        let sidecar = self.reader.sidecar_digest(root)?;
                        if &sidecar == indexed {
                            trace!(id, path = %root.path, "inventory unchanged");
                            return Ok(Loaded::Unchanged(id.to_string()));
                        }
                    }
                }
            }
        }
        Ok(Loaded::Parsed(self.reader.read(root)?))
    }

    pub fn store(&self, object: IndexedObject) -> IndexResult<()> {
        debug!(id = object.id(), head = %object.head().vnum, "indexing object");
        self.index.upsert(object)
    }

    /// Re-index one object by id.
    ///
    /// Storage problems become [`IdOutcome::Failed`] and leave any existing
    /// entry alone. Only index failures are returned as errors.
    pub fn index_id(&self, id: &str) -> JobResult<IdOutcome> {
        let existing = self.index.get(id)?;
        let root = match self.find(id, existing.as_deref()) {
            Ok(Some(root)) => root,
            Ok(None) => {
                return Ok(match existing {
                    Some(_) if self.index.delete(id)? => IdOutcome::Removed,
                    _ => IdOutcome::NotFound,
                })
            }
            Err(err) => return Ok(IdOutcome::Failed(err.to_string())),
        };

        let previous = existing
            .as_deref()
            .filter(|object| object.root_path() == root.path)
            .map(IndexedObject::id);
        let loaded = match self.load(&root, previous) {
            Ok(loaded) => loaded,
            Err(crate::JobError::Storage(err)) => return Ok(IdOutcome::Failed(err.to_string())),
            Err(err) => return Err(err),
        };
        match loaded {
            Loaded::Unchanged(_) => Ok(IdOutcome::Unchanged),
            Loaded::Parsed(object) if object.id() != id => Ok(IdOutcome::Failed(format!(
                "object at {} declares id {}",
                root.path,
                object.id()
            ))),
            Loaded::Parsed(object) => {
                self.store(object)?;
                Ok(IdOutcome::Indexed)
            }
        }
    }

    /// Where `id` lives now: the layout path first, then the path it was
    /// last indexed from.
    fn find(&self, id: &str, existing: Option<&IndexedObject>) -> StorageResult<Option<ObjectRoot>> {
        let unresolvable = match self.walker.locate(id)? {
            Located::Found(root) => return Ok(Some(root)),
            Located::Absent => false,
            Located::Unresolvable => true,
        };
        match existing {
            Some(object) => self.walker.object_at(object.root_path()),
            None if unresolvable => Err(ocfl_storage::StorageError::Layout(format!(
                "cannot locate {id}: storage root has no known layout"
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{DateTime, Duration};
    use ocfl_index::ShardedIndex;
    use ocfl_storage::InMemoryStorage;
    use ocfl_types::{ContentNode, Digest, DigestAlgorithm, LogicalPath, Spec, VNum, Version};

    /// An object with `versions` versions and one file whose content
    /// changes with each version. `generation` changes the inventory digest.
    pub(crate) fn object(id: &str, path: &str, versions: u32, generation: u8) -> IndexedObject {
        let base = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
        let mut manifest = BTreeMap::new();
        let mut out = Vec::new();
        for n in 1..=versions {
            let digest = Digest::from_bytes(&[n as u8, generation, id.len() as u8]);
            manifest.insert(digest.clone(), vec![format!("v{n}/content/data.txt")]);
            let mut state = ContentNode::empty_dir();
            state
                .insert_file(&LogicalPath::parse("data.txt").unwrap(), digest, Some(u64::from(n)))
                .unwrap();
            state.recompute_sizes();
            out.push(Version {
                vnum: VNum::new(n, 0).unwrap(),
                created: base + Duration::days(i64::from(n)),
                message: format!("version {n}"),
                user: None,
                state,
            });
        }
        IndexedObject::new(id, path, Spec::V1_1, DigestAlgorithm::Sha512, out, manifest)
            .unwrap()
            .with_inventory_digest(Digest::from_bytes(&[generation, versions as u8]))
    }

    fn setup() -> (Arc<ShardedIndex>, Arc<InMemoryStorage>, Reconciler) {
        let index = Arc::new(ShardedIndex::new());
        let storage = Arc::new(InMemoryStorage::new("test"));
        let reconciler = Reconciler::new(index.clone(), storage.clone(), storage.clone());
        (index, storage, reconciler)
    }

    #[test]
    fn index_id_stores_then_skips_unchanged() {
        let (index, storage, reconciler) = setup();
        storage.put_object(object("a", "a", 2, 0));

        assert_eq!(reconciler.index_id("a").unwrap(), IdOutcome::Indexed);
        assert_eq!(index.get("a").unwrap().unwrap().versions().len(), 2);
        assert_eq!(reconciler.index_id("a").unwrap(), IdOutcome::Unchanged);

        storage.put_object(object("a", "a", 3, 1));
        assert_eq!(reconciler.index_id("a").unwrap(), IdOutcome::Indexed);
        assert_eq!(index.get("a").unwrap().unwrap().head().vnum.num(), 3);
    }

    #[test]
    fn index_id_removes_vanished_objects() {
        let (index, storage, reconciler) = setup();
        storage.put_object(object("a", "a", 1, 0));
        reconciler.index_id("a").unwrap();

        storage.remove("a");
        assert_eq!(reconciler.index_id("a").unwrap(), IdOutcome::Removed);
        assert!(index.get("a").unwrap().is_none());
        assert_eq!(reconciler.index_id("a").unwrap(), IdOutcome::NotFound);
    }

    #[test]
    fn corrupt_inventory_keeps_previous_entry() {
        let (index, storage, reconciler) = setup();
        storage.put_object(object("a", "a", 1, 0));
        reconciler.index_id("a").unwrap();

        storage.put_corrupt("a", "unexpected end of file");
        let outcome = reconciler.index_id("a").unwrap();
        assert!(matches!(outcome, IdOutcome::Failed(ref m) if m.contains("unexpected end")));
        assert!(index.get("a").unwrap().is_some());
    }

    #[test]
    fn mismatched_id_is_rejected() {
        let (index, storage, reconciler) = setup();
        storage.put_object(object("other", "a", 1, 0));
        let outcome = reconciler.index_id("a").unwrap();
        assert!(matches!(outcome, IdOutcome::Failed(ref m) if m.contains("declares id other")));
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn unreachable_storage_fails_without_deleting() {
        let (index, storage, reconciler) = setup();
        storage.put_object(object("a", "a", 1, 0));
        reconciler.index_id("a").unwrap();

        storage.set_reachable(false);
        assert!(matches!(reconciler.index_id("a").unwrap(), IdOutcome::Failed(_)));
        assert!(index.get("a").unwrap().is_some());
    }
}
