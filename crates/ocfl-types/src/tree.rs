use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::TypeError;
use crate::path::LogicalPath;

/// A node in a version's logical state tree.
///
/// Children are kept in a `BTreeMap`, so iteration is always in name order.
/// A size is `None` when it is not known; a directory's size is only known
/// when every descendant file's size is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentNode {
    File {
        digest: Digest,
        size: Option<u64>,
    },
    Dir {
        children: BTreeMap<String, ContentNode>,
        size: Option<u64>,
    },
}

impl ContentNode {
    /// An empty directory, used as the root of a new state tree.
    pub fn empty_dir() -> Self {
        Self::Dir {
            children: BTreeMap::new(),
            size: Some(0),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir { .. })
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            Self::File { size, .. } | Self::Dir { size, .. } => *size,
        }
    }

    /// Digest of a file node; directories carry none.
    pub fn digest(&self) -> Option<&Digest> {
        match self {
            Self::File { digest, .. } => Some(digest),
            Self::Dir { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<String, ContentNode>> {
        match self {
            Self::Dir { children, .. } => Some(children),
            Self::File { .. } => None,
        }
    }

    /// Insert a file at `path`, creating intermediate directories.
    ///
    /// Fails if the path is the root, if an intermediate segment is a file,
    /// or if something already exists at `path`. Directory sizes are not
    /// updated; call [`recompute_sizes`](Self::recompute_sizes) once the tree
    /// is complete.
    pub fn insert_file(
        &mut self,
        path: &LogicalPath,
        digest: Digest,
        size: Option<u64>,
    ) -> Result<(), TypeError> {
        let Some((last, parents)) = path.segments().split_last() else {
            return Err(TypeError::PathConflict(String::new()));
        };
        let mut node = self;
        for seg in parents {
            let Self::Dir { children, .. } = node else {
                return Err(TypeError::PathConflict(path.to_string()));
            };
            node = children
                .entry(seg.clone())
                .or_insert_with(ContentNode::empty_dir);
        }
        let Self::Dir { children, .. } = node else {
            return Err(TypeError::PathConflict(path.to_string()));
        };
        match children.entry(last.clone()) {
            btree_map::Entry::Occupied(_) => Err(TypeError::PathConflict(path.to_string())),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(Self::File { digest, size });
                Ok(())
            }
        }
    }

    /// Recompute directory sizes bottom-up and return this node's size.
    pub fn recompute_sizes(&mut self) -> Option<u64> {
        match self {
            Self::File { size, .. } => *size,
            Self::Dir { children, size } => {
                let mut total = Some(0u64);
                for child in children.values_mut() {
                    let child_size = child.recompute_sizes();
                    total = match (total, child_size) {
                        (Some(t), Some(c)) => t.checked_add(c),
                        _ => None,
                    };
                }
                *size = total;
                total
            }
        }
    }

    /// Find the node at `path`, relative to this node.
    pub fn lookup(&self, path: &LogicalPath) -> Option<&ContentNode> {
        let mut node = self;
        for seg in path.segments() {
            node = node.children()?.get(seg)?;
        }
        Some(node)
    }

    /// Describe this node as a listing entry.
    pub fn to_item(&self, name: impl Into<String>) -> ContentItem {
        ContentItem {
            name: name.into(),
            is_dir: self.is_dir(),
            digest: self.digest().cloned(),
            size: self.size(),
        }
    }

    /// Depth-first, pre-order traversal of every descendant, yielding each
    /// node with its path relative to this node.
    pub fn descendants(&self) -> Descendants<'_> {
        let stack = match self {
            Self::Dir { children, .. } => vec![(LogicalPath::root(), children.iter())],
            Self::File { .. } => Vec::new(),
        };
        Descendants { stack }
    }

    /// Every file digest in this subtree, in traversal order.
    pub fn file_digests(&self) -> impl Iterator<Item = &Digest> {
        self.descendants().filter_map(|(_, node)| node.digest())
    }
}

/// Iterator returned by [`ContentNode::descendants`].
pub struct Descendants<'a> {
    stack: Vec<(LogicalPath, btree_map::Iter<'a, String, ContentNode>)>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = (LogicalPath, &'a ContentNode);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (prefix, iter) = self.stack.last_mut()?;
            match iter.next() {
                Some((name, node)) => {
                    let path = prefix.join(name);
                    if let ContentNode::Dir { children, .. } = node {
                        self.stack.push((path.clone(), children.iter()));
                    }
                    return Some((path, node));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// One entry of a state listing.
///
/// `size` is `None` when unknown; the wire form pairs it with `has_size`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub name: String,
    pub is_dir: bool,
    pub digest: Option<Digest>,
    pub size: Option<u64>,
}

impl ContentItem {
    pub fn has_size(&self) -> bool {
        self.size.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Digest {
        Digest::parse(s).unwrap()
    }

    fn p(s: &str) -> LogicalPath {
        LogicalPath::parse(s).unwrap()
    }

    fn sample() -> ContentNode {
        let mut root = ContentNode::empty_dir();
        root.insert_file(&p("README.md"), d("aa"), Some(10)).unwrap();
        root.insert_file(&p("data/b.csv"), d("bb"), Some(20)).unwrap();
        root.insert_file(&p("data/a/x.bin"), d("cc"), Some(5)).unwrap();
        root.insert_file(&p("data-old/y"), d("dd"), Some(1)).unwrap();
        root.recompute_sizes();
        root
    }

    #[test]
    fn insert_builds_directories() {
        let root = sample();
        let data = root.lookup(&p("data")).unwrap();
        assert!(data.is_dir());
        assert_eq!(data.children().unwrap().len(), 2);
        assert_eq!(data.digest(), None);
    }

    #[test]
    fn insert_conflicts() {
        let mut root = sample();
        assert!(root.insert_file(&p("README.md"), d("ff"), None).is_err());
        assert!(root.insert_file(&p("README.md/inner"), d("ff"), None).is_err());
        assert!(root.insert_file(&LogicalPath::root(), d("ff"), None).is_err());
    }

    #[test]
    fn sizes_roll_up() {
        let root = sample();
        assert_eq!(root.size(), Some(36));
        assert_eq!(root.lookup(&p("data")).unwrap().size(), Some(25));
    }

    #[test]
    fn unknown_size_propagates_up() {
        let mut root = sample();
        root.insert_file(&p("data/a/unknown"), d("ee"), None).unwrap();
        root.recompute_sizes();
        assert_eq!(root.size(), None);
        assert_eq!(root.lookup(&p("data/a")).unwrap().size(), None);
        assert_eq!(root.lookup(&p("data-old")).unwrap().size(), Some(1));
        let item = root.lookup(&p("data/a/unknown")).unwrap().to_item("unknown");
        assert!(!item.has_size());
    }

    #[test]
    fn lookup_missing() {
        let root = sample();
        assert!(root.lookup(&p("nope")).is_none());
        assert!(root.lookup(&p("README.md/x")).is_none());
        assert_eq!(root.lookup(&LogicalPath::root()), Some(&root));
    }

    #[test]
    fn descendants_are_preorder() {
        let root = sample();
        let paths: Vec<String> = root.descendants().map(|(p, _)| p.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "README.md",
                "data",
                "data/a",
                "data/a/x.bin",
                "data/b.csv",
                "data-old",
                "data-old/y",
            ]
        );
    }

    #[test]
    fn descendants_order_matches_path_order() {
        let root = sample();
        let paths: Vec<LogicalPath> = root.descendants().map(|(p, _)| p).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn file_has_no_descendants() {
        let root = sample();
        let file = root.lookup(&p("README.md")).unwrap();
        assert_eq!(file.descendants().count(), 0);
        assert_eq!(root.file_digests().count(), 4);
    }

    fn segment() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "a-b", "a.b", "a0", "z"]).prop_map(String::from)
    }

    proptest! {
        #[test]
        fn descendants_are_sorted_by_path(
            paths in prop::collection::vec(prop::collection::vec(segment(), 1..4), 1..20)
        ) {
            let mut root = ContentNode::empty_dir();
            let mut inserted = Vec::new();
            for segments in paths {
                let path = LogicalPath::parse(&segments.join("/")).unwrap();
                // conflicting paths are skipped
                if root.insert_file(&path, d("aa"), Some(1)).is_ok() {
                    inserted.push(path);
                }
            }
            let walked: Vec<LogicalPath> = root.descendants().map(|(p, _)| p).collect();
            prop_assert!(walked.windows(2).all(|w| w[0] < w[1]));
            for path in &inserted {
                prop_assert!(walked.contains(path));
            }
            prop_assert_eq!(root.file_digests().count(), inserted.len());
        }
    }
}
