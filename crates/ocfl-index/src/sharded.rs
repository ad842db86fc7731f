use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ocfl_types::{ContentLocation, Digest, IndexedObject, ObjectSummary, StorageRootInfo};

use crate::error::{IndexError, IndexResult};
use crate::sort::ObjectSort;
use crate::traits::{IndexStore, Page};

/// Default number of lock shards.
pub const DEFAULT_SHARDS: usize = 16;

type ObjectShard = RwLock<HashMap<String, Arc<IndexedObject>>>;
type DigestShard = RwLock<HashMap<Digest, BTreeSet<String>>>;

fn read<T>(lock: &RwLock<T>) -> IndexResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| IndexError::Poisoned(e.to_string()))
}

fn write<T>(lock: &RwLock<T>) -> IndexResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| IndexError::Poisoned(e.to_string()))
}

/// In-memory index with sharded locks.
///
/// Objects are spread across shards by a hash of their id, and the digest
/// map by a hash of the digest. A writer holds its object's shard lock for
/// the whole update, taking digest shard locks inside it; readers never
/// nest locks. Readers receive `Arc` snapshots, so a long query never holds
/// a lock.
pub struct ShardedIndex {
    objects: Vec<ObjectShard>,
    digests: Vec<DigestShard>,
    root: RwLock<Option<StorageRootInfo>>,
}

impl ShardedIndex {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            objects: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
            digests: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
            root: RwLock::new(None),
        }
    }

    fn shard_for<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.objects.len() as u64) as usize
    }

    fn link_digests<'a>(&self, id: &str, digests: impl Iterator<Item = &'a Digest>) -> IndexResult<()> {
        for digest in digests {
            let mut shard = write(&self.digests[self.shard_for(digest)])?;
            shard.entry(digest.clone()).or_default().insert(id.to_string());
        }
        Ok(())
    }

    fn unlink_digests<'a>(&self, id: &str, digests: impl Iterator<Item = &'a Digest>) -> IndexResult<()> {
        for digest in digests {
            let mut shard = write(&self.digests[self.shard_for(digest)])?;
            if let Some(ids) = shard.get_mut(digest) {
                ids.remove(id);
                if ids.is_empty() {
                    shard.remove(digest);
                }
            }
        }
        Ok(())
    }

    /// Snapshot of every indexed object, in no particular order.
    pub fn objects(&self) -> IndexResult<Vec<Arc<IndexedObject>>> {
        let mut all = Vec::new();
        for shard in &self.objects {
            all.extend(read(shard)?.values().cloned());
        }
        Ok(all)
    }
}

impl Default for ShardedIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore for ShardedIndex {
    fn upsert(&self, object: IndexedObject) -> IndexResult<()> {
        let id = object.id().to_string();
        let mut shard = write(&self.objects[self.shard_for(id.as_str())])?;

        // Link new digests before the swap so a digest that survives the
        // update stays resolvable throughout.
        self.link_digests(&id, object.manifest().keys())?;
        let new = Arc::new(object);
        let old = shard.insert(id.clone(), Arc::clone(&new));
        if let Some(old) = old {
            let stale = old
                .manifest()
                .keys()
                .filter(|d| !new.manifest().contains_key(*d));
            self.unlink_digests(&id, stale)?;
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> IndexResult<bool> {
        let mut shard = write(&self.objects[self.shard_for(id)])?;
        match shard.remove(id) {
            Some(old) => {
                self.unlink_digests(id, old.manifest().keys())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self, id: &str) -> IndexResult<Option<Arc<IndexedObject>>> {
        Ok(read(&self.objects[self.shard_for(id)])?.get(id).cloned())
    }

    fn scan(
        &self,
        sort: ObjectSort,
        cursor: Option<&str>,
        limit: usize,
    ) -> IndexResult<Page<ObjectSummary>> {
        let after = cursor.map(|c| sort.decode(c)).transpose()?;
        let mut entries = Vec::new();
        for shard in &self.objects {
            for object in read(shard)?.values() {
                let summary = object.summary();
                let key = sort.key(&summary);
                if let Some(after) = &after {
                    if sort.compare(&key, after).is_le() {
                        continue;
                    }
                }
                entries.push((key, summary));
            }
        }
        entries.sort_unstable_by(|a, b| sort.compare(&a.0, &b.0));

        let limit = limit.max(1);
        let next_cursor = if entries.len() > limit {
            Some(sort.encode(&entries[limit - 1].0)?)
        } else {
            None
        };
        entries.truncate(limit);
        Ok(Page {
            items: entries.into_iter().map(|(_, summary)| summary).collect(),
            next_cursor,
        })
    }

    fn resolve_digest(&self, digest: &Digest) -> IndexResult<Option<ContentLocation>> {
        let ids = match read(&self.digests[self.shard_for(digest)])?.get(digest) {
            Some(ids) => ids.clone(),
            None => return Ok(None),
        };
        for id in ids {
            if let Some(object) = self.get(&id)? {
                if let Some(path) = object.content_path(digest) {
                    return Ok(Some(ContentLocation {
                        object_id: id,
                        path,
                    }));
                }
            }
        }
        Ok(None)
    }

    fn object_roots(&self) -> IndexResult<BTreeMap<String, String>> {
        let mut roots = BTreeMap::new();
        for shard in &self.objects {
            for (id, object) in read(shard)?.iter() {
                roots.insert(id.clone(), object.root_path().to_string());
            }
        }
        Ok(roots)
    }

    fn count(&self) -> IndexResult<usize> {
        let mut n = 0;
        for shard in &self.objects {
            n += read(shard)?.len();
        }
        Ok(n)
    }

    fn root_info(&self) -> IndexResult<Option<StorageRootInfo>> {
        Ok(read(&self.root)?.clone())
    }

    fn set_root_info(&self, info: StorageRootInfo) -> IndexResult<()> {
        *write(&self.root)? = Some(info);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{DateTime, Duration, FixedOffset};
    use ocfl_types::{ContentNode, DigestAlgorithm, LogicalPath, Spec, VNum, Version};
    use proptest::prelude::*;

    use crate::sort::{SortField, SortOrder};

    /// An object with `versions` versions created a day apart from `day0`,
    /// and one file per entry in `files` (name, digest).
    pub(crate) fn object(id: &str, day0: i64, versions: u32, files: &[(&str, &str)]) -> IndexedObject {
        let base = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
        let mut state = ContentNode::empty_dir();
        let mut manifest = BTreeMap::new();
        for (name, digest) in files {
            let d = Digest::parse(digest).unwrap();
            state
                .insert_file(&LogicalPath::parse(name).unwrap(), d.clone(), Some(1))
                .unwrap();
            manifest.insert(d, vec![format!("v1/content/{name}")]);
        }
        state.recompute_sizes();
        let versions = (1..=versions)
            .map(|n| Version {
                vnum: VNum::new(n, 0).unwrap(),
                created: base + Duration::days(day0 + i64::from(n)),
                message: format!("v{n}"),
                user: None,
                state: state.clone(),
            })
            .collect();
        IndexedObject::new(id, id, Spec::V1_1, DigestAlgorithm::Sha512, versions, manifest).unwrap()
    }

    fn ids(page: &Page<ObjectSummary>) -> Vec<&str> {
        page.items.iter().map(|s| s.id.as_str()).collect()
    }

    fn collect_all(index: &ShardedIndex, sort: ObjectSort, page_size: usize) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = index.scan(sort, cursor.as_deref(), page_size).unwrap();
            out.extend(page.items.iter().map(|s| s.id.clone()));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return out,
            }
        }
    }

    #[test]
    fn upsert_get_delete() {
        let index = ShardedIndex::new();
        index.upsert(object("a", 0, 1, &[("f", "aa")])).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.get("a").unwrap().unwrap().id(), "a");
        assert!(index.delete("a").unwrap());
        assert!(!index.delete("a").unwrap());
        assert!(index.get("a").unwrap().is_none());
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn upsert_replaces_without_duplicating() {
        let index = ShardedIndex::new();
        index.upsert(object("a", 0, 1, &[])).unwrap();
        index.upsert(object("a", 0, 2, &[])).unwrap();
        index.upsert(object("a", 0, 2, &[])).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.get("a").unwrap().unwrap().versions().len(), 2);
    }

    #[test]
    fn digest_resolution_follows_updates() {
        let index = ShardedIndex::new();
        index.upsert(object("a", 0, 1, &[("f", "aa"), ("g", "bb")])).unwrap();
        let loc = index.resolve_digest(&Digest::parse("AA").unwrap()).unwrap().unwrap();
        assert_eq!(loc.object_id, "a");
        assert_eq!(loc.path, "a/v1/content/f");

        index.upsert(object("a", 0, 1, &[("g", "bb")])).unwrap();
        assert!(index.resolve_digest(&Digest::parse("aa").unwrap()).unwrap().is_none());
        assert!(index.resolve_digest(&Digest::parse("bb").unwrap()).unwrap().is_some());
    }

    #[test]
    fn shared_digest_survives_one_delete() {
        let index = ShardedIndex::new();
        index.upsert(object("a", 0, 1, &[("f", "cc")])).unwrap();
        index.upsert(object("b", 0, 1, &[("f", "cc")])).unwrap();
        index.delete("a").unwrap();
        let loc = index.resolve_digest(&Digest::parse("cc").unwrap()).unwrap().unwrap();
        assert_eq!(loc.object_id, "b");
        index.delete("b").unwrap();
        assert!(index.resolve_digest(&Digest::parse("cc").unwrap()).unwrap().is_none());
    }

    #[test]
    fn two_object_pagination() {
        let index = ShardedIndex::new();
        index.upsert(object("b", 0, 1, &[])).unwrap();
        index.upsert(object("a", 0, 1, &[])).unwrap();
        let sort = ObjectSort::default();
        let first = index.scan(sort, None, 1).unwrap();
        assert_eq!(ids(&first), vec!["a"]);
        let token = first.next_cursor.unwrap();
        let second = index.scan(sort, Some(&token), 1).unwrap();
        assert_eq!(ids(&second), vec!["b"]);
        assert!(second.next_cursor.is_none());
    }

    #[test]
    fn sorts_by_creation_time() {
        let index = ShardedIndex::new();
        index.upsert(object("old", 0, 5, &[])).unwrap();
        index.upsert(object("new", 2, 1, &[])).unwrap();
        index.upsert(object("mid", 1, 1, &[])).unwrap();

        let v1 = ObjectSort::new(SortField::V1Created, SortOrder::Asc);
        assert_eq!(collect_all(&index, v1, 10), vec!["old", "mid", "new"]);
        let head = ObjectSort::new(SortField::HeadCreated, SortOrder::Desc);
        assert_eq!(collect_all(&index, head, 2), vec!["old", "new", "mid"]);
    }

    #[test]
    fn cursor_from_other_sort_rejected() {
        let index = ShardedIndex::new();
        index.upsert(object("a", 0, 1, &[])).unwrap();
        index.upsert(object("b", 0, 1, &[])).unwrap();
        let page = index.scan(ObjectSort::default(), None, 1).unwrap();
        let token = page.next_cursor.unwrap();
        let desc = ObjectSort::new(SortField::Id, SortOrder::Desc);
        assert!(matches!(
            index.scan(desc, Some(&token), 1),
            Err(IndexError::InvalidCursor(_))
        ));
        assert!(matches!(
            index.scan(ObjectSort::default(), Some("not-a-cursor"), 1),
            Err(IndexError::InvalidCursor(_))
        ));
    }

    #[test]
    fn cursor_survives_deleting_returned_object() {
        let index = ShardedIndex::new();
        for id in ["a", "b", "c"] {
            index.upsert(object(id, 0, 1, &[])).unwrap();
        }
        let sort = ObjectSort::default();
        let page = index.scan(sort, None, 1).unwrap();
        index.delete("a").unwrap();
        let rest = index.scan(sort, page.next_cursor.as_deref(), 10).unwrap();
        assert_eq!(ids(&rest), vec!["b", "c"]);
    }

    #[test]
    fn object_roots_and_root_info() {
        let index = ShardedIndex::with_shards(2);
        index.upsert(object("a", 0, 1, &[])).unwrap();
        assert_eq!(
            index.object_roots().unwrap(),
            BTreeMap::from([("a".to_string(), "a".to_string())])
        );
        assert!(index.root_info().unwrap().is_none());
        index
            .set_root_info(StorageRootInfo {
                root_path: "/data".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(index.root_info().unwrap().unwrap().root_path, "/data");
    }

    fn arb_sort() -> impl Strategy<Value = ObjectSort> {
        (0..3u8, any::<bool>()).prop_map(|(f, desc)| {
            let field = match f {
                0 => SortField::Id,
                1 => SortField::V1Created,
                _ => SortField::HeadCreated,
            };
            let order = if desc { SortOrder::Desc } else { SortOrder::Asc };
            ObjectSort::new(field, order)
        })
    }

    proptest! {
        #[test]
        fn pages_cover_every_object_once(
            objects in prop::collection::btree_map("[a-z]{1,6}", (0i64..5, 1u32..4), 0..40),
            sort in arb_sort(),
            page_size in 1usize..7,
        ) {
            let index = ShardedIndex::with_shards(4);
            for (id, (day, versions)) in &objects {
                index.upsert(object(id, *day, *versions, &[])).unwrap();
            }
            let listed = collect_all(&index, sort, page_size);

            let mut expected: Vec<_> = objects
                .keys()
                .map(|id| {
                    let summary = index.get(id).unwrap().unwrap().summary();
                    (sort.key(&summary), id.clone())
                })
                .collect();
            expected.sort_by(|a, b| sort.compare(&a.0, &b.0));
            let expected: Vec<String> = expected.into_iter().map(|(_, id)| id).collect();
            prop_assert_eq!(listed, expected);
        }
    }
}
