use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use ocfl_types::{ContentLocation, Digest, IndexedObject, ObjectSummary, StorageRootInfo};

use crate::error::{IndexError, IndexResult};
use crate::log::{IndexLog, LogConfig, LogRecord};
use crate::sharded::ShardedIndex;
use crate::sort::ObjectSort;
use crate::traits::{IndexStore, Page};

/// Minimum number of superseded records before a compaction on open.
const COMPACT_SLACK: usize = 1024;

/// A [`ShardedIndex`] whose changes are recorded in an [`IndexLog`].
///
/// Each write appends its record and applies it to memory while holding the
/// write lock, so the log order matches the order readers observed. Reads go
/// straight to the in-memory index and never take the write lock.
pub struct PersistentIndex {
    memory: ShardedIndex,
    log: IndexLog,
    write_lock: Mutex<()>,
}

impl PersistentIndex {
    /// Open the index at `path`, replaying any existing log.
    pub fn open(path: &Path, config: LogConfig) -> IndexResult<Self> {
        let log = IndexLog::open(path, config)?;
        let memory = ShardedIndex::new();
        let records = log.replay()?;
        let replayed = records.len();
        for record in records {
            match record {
                LogRecord::Upsert(object) => memory.upsert(object.into_owned())?,
                LogRecord::Delete(id) => {
                    memory.delete(&id)?;
                }
                LogRecord::Root(info) => memory.set_root_info(info.into_owned())?,
            }
        }
        let index = Self {
            memory,
            log,
            write_lock: Mutex::new(()),
        };
        let live = index.memory.count()?;
        info!(path = %path.display(), records = replayed, objects = live, "index opened");
        if replayed > live + 1 + COMPACT_SLACK {
            index.compact()?;
        }
        Ok(index)
    }

    fn lock(&self) -> IndexResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| IndexError::Poisoned(e.to_string()))
    }

    /// Size of the backing log in bytes.
    pub fn log_size(&self) -> u64 {
        self.log.offset()
    }
}

impl IndexStore for PersistentIndex {
    fn upsert(&self, object: IndexedObject) -> IndexResult<()> {
        let _guard = self.lock()?;
        self.log.append(&LogRecord::Upsert(Cow::Borrowed(&object)))?;
        self.memory.upsert(object)
    }

    fn delete(&self, id: &str) -> IndexResult<bool> {
        let _guard = self.lock()?;
        if self.memory.get(id)?.is_none() {
            return Ok(false);
        }
        self.log.append(&LogRecord::Delete(Cow::Borrowed(id)))?;
        self.memory.delete(id)
    }

    fn get(&self, id: &str) -> IndexResult<Option<Arc<IndexedObject>>> {
        self.memory.get(id)
    }

    fn scan(
        &self,
        sort: ObjectSort,
        cursor: Option<&str>,
        limit: usize,
    ) -> IndexResult<Page<ObjectSummary>> {
        self.memory.scan(sort, cursor, limit)
    }

    fn resolve_digest(&self, digest: &Digest) -> IndexResult<Option<ContentLocation>> {
        self.memory.resolve_digest(digest)
    }

    fn object_roots(&self) -> IndexResult<BTreeMap<String, String>> {
        self.memory.object_roots()
    }

    fn count(&self) -> IndexResult<usize> {
        self.memory.count()
    }

    fn root_info(&self) -> IndexResult<Option<StorageRootInfo>> {
        self.memory.root_info()
    }

    fn set_root_info(&self, info: StorageRootInfo) -> IndexResult<()> {
        let _guard = self.lock()?;
        self.log.append(&LogRecord::Root(Cow::Borrowed(&info)))?;
        self.memory.set_root_info(info)
    }

    /// Rewrite the log with one record per live object.
    fn compact(&self) -> IndexResult<()> {
        let _guard = self.lock()?;
        let objects = self.memory.objects()?;
        let root = self.memory.root_info()?;
        let before = self.log.offset();
        let records = objects
            .iter()
            .map(|o| LogRecord::Upsert(Cow::Borrowed(o.as_ref())))
            .chain(root.as_ref().map(|r| LogRecord::Root(Cow::Borrowed(r))));
        self.log.rewrite(records)?;
        info!(objects = objects.len(), before, after = self.log.offset(), "index log compacted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharded::tests::object;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.log");
        {
            let index = PersistentIndex::open(&path, LogConfig::default()).unwrap();
            index.upsert(object("a", 0, 1, &[("f", "aa")])).unwrap();
            index.upsert(object("b", 0, 2, &[("f", "bb")])).unwrap();
            index.upsert(object("b", 0, 3, &[("f", "bb")])).unwrap();
            index.delete("a").unwrap();
            index
                .set_root_info(StorageRootInfo {
                    root_path: "/data".into(),
                    description: "desc".into(),
                    ..Default::default()
                })
                .unwrap();
        }
        let index = PersistentIndex::open(&path, LogConfig::default()).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.get("b").unwrap().unwrap().versions().len(), 3);
        assert!(index.get("a").unwrap().is_none());
        assert!(index.resolve_digest(&Digest::parse("aa").unwrap()).unwrap().is_none());
        assert_eq!(index.root_info().unwrap().unwrap().description, "desc");
    }

    #[test]
    fn deleting_missing_id_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let index = PersistentIndex::open(&dir.path().join("index.log"), LogConfig::default()).unwrap();
        assert!(!index.delete("nope").unwrap());
        assert_eq!(index.log_size(), 0);
    }

    #[test]
    fn compact_shrinks_log_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.log");
        let index = PersistentIndex::open(&path, LogConfig::default()).unwrap();
        for n in 1..=5 {
            index.upsert(object("a", 0, n, &[("f", "aa")])).unwrap();
        }
        index
            .set_root_info(StorageRootInfo {
                root_path: "/r".into(),
                ..Default::default()
            })
            .unwrap();
        let before = index.log_size();
        index.compact().unwrap();
        assert!(index.log_size() < before);
        drop(index);

        let index = PersistentIndex::open(&path, LogConfig::default()).unwrap();
        assert_eq!(index.get("a").unwrap().unwrap().versions().len(), 5);
        assert_eq!(index.root_info().unwrap().unwrap().root_path, "/r");
    }
}
