//! In-memory storage for tests and embedding.
//!
//! [`InMemoryStorage`] holds objects keyed by root path and implements every
//! storage trait. Objects can be added, removed, or replaced by a corrupt
//! placeholder between runs, and the root can be made unreachable, which
//! makes indexing scenarios deterministic.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use ocfl_types::{Digest, IndexedObject, Spec};

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    ContentReader, ContentSource, InventoryReader, Located, ObjectRoot, RootDescription,
    StorageWalker,
};

#[derive(Clone, Debug)]
enum Entry {
    Valid(IndexedObject),
    Corrupt(String),
}

#[derive(Debug)]
struct State {
    description: RootDescription,
    reachable: bool,
    walk_error: Option<String>,
    objects: BTreeMap<String, Entry>,
    content: HashMap<String, Bytes>,
}

/// An in-memory implementation of the storage traits.
///
/// Objects live at their [`IndexedObject::root_path`]. The layout is flat:
/// [`locate`](StorageWalker::locate) looks for an object root named after
/// the id.
#[derive(Debug)]
pub struct InMemoryStorage {
    state: RwLock<State>,
}

impl InMemoryStorage {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(State {
                description: RootDescription {
                    spec: Spec::V1_1,
                    description: description.into(),
                    layout: Some(crate::layout::FLAT_DIRECT.to_string()),
                },
                reachable: true,
                walk_error: None,
                objects: BTreeMap::new(),
                content: HashMap::new(),
            }),
        }
    }

    fn read_state(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| StorageError::Walk(format!("lock poisoned: {e}")))
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add or replace an object at its root path.
    pub fn put_object(&self, object: IndexedObject) {
        let path = object.root_path().to_string();
        self.write_state().objects.insert(path, Entry::Valid(object));
    }

    /// Place an object root whose inventory cannot be parsed.
    pub fn put_corrupt(&self, path: impl Into<String>, reason: impl Into<String>) {
        self.write_state()
            .objects
            .insert(path.into(), Entry::Corrupt(reason.into()));
    }

    /// Remove the object root at `path`. Returns `true` if it existed.
    pub fn remove(&self, path: &str) -> bool {
        self.write_state().objects.remove(path).is_some()
    }

    /// Store bytes at a content path relative to the root.
    pub fn put_content(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.write_state().content.insert(path.into(), data.into());
    }

    /// Make the whole root unreachable, as for an unmounted volume.
    pub fn set_reachable(&self, reachable: bool) {
        self.write_state().reachable = reachable;
    }

    /// Make walks fail after yielding every object root.
    pub fn set_walk_error(&self, error: Option<String>) {
        self.write_state().walk_error = error;
    }

    pub fn len(&self) -> usize {
        self.read_state().map(|s| s.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_reachable(state: &State) -> StorageResult<()> {
        if state.reachable {
            Ok(())
        } else {
            Err(StorageError::RootUnavailable {
                path: "memory".into(),
                reason: "storage root is unreachable".into(),
            })
        }
    }

    fn entry(&self, root: &ObjectRoot) -> StorageResult<Entry> {
        let state = self.read_state()?;
        Self::check_reachable(&state)?;
        state
            .objects
            .get(&root.path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(root.path.clone()))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new("")
    }
}

impl StorageWalker for InMemoryStorage {
    fn root_path(&self) -> String {
        "memory".to_string()
    }

    fn describe(&self) -> StorageResult<RootDescription> {
        let state = self.read_state()?;
        Self::check_reachable(&state)?;
        Ok(state.description.clone())
    }

    fn walk(&self) -> StorageResult<Box<dyn Iterator<Item = StorageResult<ObjectRoot>> + Send + '_>> {
        let state = self.read_state()?;
        Self::check_reachable(&state)?;
        let mut items: Vec<StorageResult<ObjectRoot>> = state
            .objects
            .keys()
            .map(|path| {
                Ok(ObjectRoot {
                    path: path.clone(),
                    spec: state.description.spec,
                })
            })
            .collect();
        if let Some(err) = &state.walk_error {
            items.push(Err(StorageError::Walk(err.clone())));
        }
        Ok(Box::new(items.into_iter()))
    }

    fn locate(&self, id: &str) -> StorageResult<Located> {
        Ok(match self.object_at(id)? {
            Some(root) => Located::Found(root),
            None => Located::Absent,
        })
    }

    fn object_at(&self, path: &str) -> StorageResult<Option<ObjectRoot>> {
        let state = self.read_state()?;
        Self::check_reachable(&state)?;
        Ok(state.objects.contains_key(path).then(|| ObjectRoot {
            path: path.to_string(),
            spec: state.description.spec,
        }))
    }
}

impl InventoryReader for InMemoryStorage {
    fn sidecar_digest(&self, root: &ObjectRoot) -> StorageResult<Digest> {
        match self.entry(root)? {
            Entry::Valid(object) => object.inventory_digest().cloned().ok_or_else(|| {
                StorageError::InvalidInventory {
                    path: root.path.clone(),
                    reason: "missing inventory sidecar".into(),
                }
            }),
            Entry::Corrupt(reason) => Err(StorageError::InvalidInventory {
                path: root.path.clone(),
                reason,
            }),
        }
    }

    fn read(&self, root: &ObjectRoot) -> StorageResult<IndexedObject> {
        match self.entry(root)? {
            Entry::Valid(object) => Ok(object),
            Entry::Corrupt(reason) => Err(StorageError::InvalidInventory {
                path: root.path.clone(),
                reason,
            }),
        }
    }
}

#[async_trait]
impl ContentSource for InMemoryStorage {
    async fn open(&self, path: &str) -> StorageResult<ContentReader> {
        let data = {
            let state = self.read_state()?;
            Self::check_reachable(&state)?;
            state
                .content
                .get(path)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(path.to_string()))?
        };
        Ok(Box::new(Cursor::new(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::DateTime;
    use ocfl_types::{ContentNode, DigestAlgorithm, VNum, Version};
    use tokio::io::AsyncReadExt;

    fn object(id: &str) -> IndexedObject {
        IndexedObject::new(
            id,
            id,
            Spec::V1_1,
            DigestAlgorithm::Sha512,
            vec![Version {
                vnum: VNum::v1(),
                created: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
                message: String::new(),
                user: None,
                state: ContentNode::empty_dir(),
            }],
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn walk_yields_every_root() {
        let storage = InMemoryStorage::new("mem");
        storage.put_object(object("b"));
        storage.put_object(object("a"));
        storage.put_corrupt("c", "bad json");
        let paths: Vec<String> = storage.walk().unwrap().map(|r| r.unwrap().path).collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
    }

    #[test]
    fn unreachable_root_fails_everything() {
        let storage = InMemoryStorage::new("mem");
        storage.put_object(object("a"));
        storage.set_reachable(false);
        assert!(storage.describe().is_err());
        assert!(storage.walk().is_err());
        assert!(storage.locate("a").is_err());
    }

    #[test]
    fn walk_error_is_reported_last() {
        let storage = InMemoryStorage::new("mem");
        storage.put_object(object("a"));
        storage.set_walk_error(Some("permission denied".into()));
        let items: Vec<_> = storage.walk().unwrap().collect();
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(StorageError::Walk(_))));
    }

    #[test]
    fn corrupt_object_fails_to_read() {
        let storage = InMemoryStorage::new("mem");
        storage.put_corrupt("c", "bad json");
        let root = storage.object_at("c").unwrap().unwrap();
        assert!(storage.read(&root).is_err());
        assert!(storage.sidecar_digest(&root).is_err());
    }

    #[test]
    fn locate_uses_flat_paths() {
        let storage = InMemoryStorage::new("mem");
        storage.put_object(object("a"));
        assert!(matches!(storage.locate("a").unwrap(), Located::Found(_)));
        assert_eq!(storage.locate("z").unwrap(), Located::Absent);
        assert!(storage.remove("a"));
        assert_eq!(storage.locate("a").unwrap(), Located::Absent);
    }

    #[tokio::test]
    async fn open_returns_bytes() {
        let storage = InMemoryStorage::new("mem");
        storage.put_content("a/v1/content/f", &b"data"[..]);
        let mut reader = storage.open("a/v1/content/f").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"data");
        assert!(storage.open("missing").await.is_err());
    }
}
