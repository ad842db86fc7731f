//! Version state traversal.

use serde::{Deserialize, Serialize};

use ocfl_index::{decode_cursor, encode_cursor};
use ocfl_types::{ContentItem, ContentNode, DigestAlgorithm, IndexedObject, LogicalPath, VNum, Version};

use crate::error::{QueryError, QueryResult};

/// Parameters of a state listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateRequest {
    pub object_id: String,
    /// `""` or `"head"` for the head version, otherwise a label like `v2`.
    pub version: String,
    /// Path inside the version; `""` is the version root.
    pub base_path: String,
    /// List the whole subtree instead of immediate children.
    pub recursive: bool,
    /// Empty to start from the beginning.
    pub cursor: String,
    pub page_size: i64,
}

/// One page of a state listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePage {
    pub object_id: String,
    /// The version listed, after resolving `head`.
    pub version: VNum,
    pub digest_algorithm: DigestAlgorithm,
    /// The cleaned base path.
    pub base_path: String,
    /// The node at the base path itself. When it is a file, `items` holds
    /// only that file.
    pub node: ContentItem,
    /// Names are relative to the base path.
    pub items: Vec<ContentItem>,
    pub next_cursor: Option<String>,
}

/// Position in a state listing. Bound to the request that produced it;
/// `version` pins `head` to the version served on the first page.
#[derive(Debug, Serialize, Deserialize)]
struct StateCursor {
    object: String,
    version: u32,
    base: String,
    recursive: bool,
    after: String,
}

pub(crate) fn list(
    object: &IndexedObject,
    request: &StateRequest,
    limit: usize,
) -> QueryResult<StatePage> {
    let base = LogicalPath::parse(&request.base_path)
        .map_err(|e| QueryError::InvalidArgument(e.to_string()))?;
    let base_str = base.to_string();

    let cursor: Option<StateCursor> = if request.cursor.is_empty() {
        None
    } else {
        Some(decode_cursor(&request.cursor)?)
    };
    let version = match &cursor {
        Some(c) => {
            if c.object != object.id() || c.base != base_str || c.recursive != request.recursive {
                return Err(QueryError::InvalidArgument(
                    "cursor does not match this request".into(),
                ));
            }
            let pinned = pinned_version(object, c.version)?;
            if !is_head_label(&request.version) && resolve(object, &request.version)?.vnum.num() != c.version {
                return Err(QueryError::InvalidArgument(
                    "cursor was issued for another version".into(),
                ));
            }
            pinned
        }
        None => resolve(object, &request.version)?,
    };

    let node = version.state.lookup(&base).ok_or_else(|| {
        QueryError::NotFound(format!(
            "path {base_str:?} in {} {}",
            object.id(),
            version.vnum
        ))
    })?;

    let mut page = StatePage {
        object_id: object.id().to_string(),
        version: version.vnum,
        digest_algorithm: object.digest_algorithm(),
        base_path: base_str.clone(),
        node: node.to_item(base.file_name().unwrap_or_default()),
        items: Vec::new(),
        next_cursor: None,
    };
    if !node.is_dir() {
        page.items.push(page.node.clone());
        return Ok(page);
    }

    let after = match &cursor {
        Some(c) => Some(
            LogicalPath::parse(&c.after)
                .map_err(|e| QueryError::InvalidArgument(format!("invalid cursor: {e}")))?,
        ),
        None => None,
    };
    let entries: Box<dyn Iterator<Item = (LogicalPath, &ContentNode)> + '_> = if request.recursive {
        Box::new(node.descendants())
    } else {
        Box::new(
            node.children()
                .into_iter()
                .flatten()
                .map(|(name, child)| (LogicalPath::root().join(name), child)),
        )
    };
    // Both orders are ascending by path segments, so resuming is a skip.
    let mut remaining = entries.skip_while(|(path, _)| after.as_ref().is_some_and(|a| path <= a));

    let mut last = None;
    for (path, child) in remaining.by_ref().take(limit) {
        page.items.push(child.to_item(path.to_string()));
        last = Some(path);
    }
    if let (Some(last), Some(_)) = (last, remaining.next()) {
        page.next_cursor = Some(encode_cursor(&StateCursor {
            object: object.id().to_string(),
            version: version.vnum.num(),
            base: base_str,
            recursive: request.recursive,
            after: last.to_string(),
        })?);
    }
    Ok(page)
}

fn is_head_label(label: &str) -> bool {
    label.is_empty() || label.eq_ignore_ascii_case("head")
}

/// Resolve a version label against the object's history.
fn resolve<'a>(object: &'a IndexedObject, label: &str) -> QueryResult<&'a Version> {
    if is_head_label(label) {
        return Ok(object.head());
    }
    let vnum: VNum = label
        .parse()
        .map_err(|e: ocfl_types::TypeError| QueryError::InvalidArgument(e.to_string()))?;
    object
        .version(&vnum)
        .ok_or_else(|| QueryError::NotFound(format!("version {label} of {}", object.id())))
}

fn pinned_version(object: &IndexedObject, num: u32) -> QueryResult<&Version> {
    let vnum = VNum::new(num, 0).map_err(|e| QueryError::InvalidArgument(format!("invalid cursor: {e}")))?;
    object
        .version(&vnum)
        .ok_or_else(|| QueryError::NotFound(format!("version {vnum} of {}", object.id())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::object;

    const FILES: &[(&str, &str, Option<u64>)] = &[
        ("a.txt", "aa", Some(3)),
        ("dir/b.txt", "bb", Some(4)),
        ("dir/sub/c.txt", "cc", Some(5)),
        ("z.txt", "dd", None),
    ];

    fn req(base: &str, recursive: bool) -> StateRequest {
        StateRequest {
            object_id: "obj".into(),
            base_path: base.into(),
            recursive,
            ..StateRequest::default()
        }
    }

    fn names(page: &StatePage) -> Vec<&str> {
        page.items.iter().map(|i| i.name.as_str()).collect()
    }

    fn all_pages(object: &IndexedObject, mut request: StateRequest, limit: usize) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            let page = list(object, &request, limit).unwrap();
            out.extend(page.items.iter().map(|i| i.name.clone()));
            match page.next_cursor {
                Some(next) => request.cursor = next,
                None => return out,
            }
        }
    }

    #[test]
    fn immediate_children_of_root() {
        let obj = object("obj", 0, 1, FILES);
        let page = list(&obj, &req("", false), 100).unwrap();
        assert!(page.node.is_dir);
        assert!(!page.node.has_size());
        assert_eq!(names(&page), ["a.txt", "dir", "z.txt"]);
        assert!(page.items[1].is_dir);
        assert!(page.items[1].digest.is_none());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn recursive_listing_is_preorder() {
        let obj = object("obj", 0, 1, FILES);
        let page = list(&obj, &req(".", true), 100).unwrap();
        assert_eq!(
            names(&page),
            ["a.txt", "dir", "dir/b.txt", "dir/sub", "dir/sub/c.txt", "z.txt"]
        );
        let sub = list(&obj, &req("dir/", true), 100).unwrap();
        assert_eq!(names(&sub), ["b.txt", "sub", "sub/c.txt"]);
    }

    #[test]
    fn pages_concatenate_to_full_listing() {
        let obj = object("obj", 0, 1, FILES);
        for limit in 1..=4 {
            assert_eq!(
                all_pages(&obj, req("", true), limit),
                ["a.txt", "dir", "dir/b.txt", "dir/sub", "dir/sub/c.txt", "z.txt"]
            );
            assert_eq!(all_pages(&obj, req("", false), limit), ["a.txt", "dir", "z.txt"]);
        }
    }

    #[test]
    fn file_base_returns_itself() {
        let obj = object("obj", 0, 1, FILES);
        let page = list(&obj, &req("dir/b.txt", true), 100).unwrap();
        assert!(!page.node.is_dir);
        assert_eq!(names(&page), ["b.txt"]);
        assert_eq!(page.items[0].size, Some(4));
        assert_eq!(page.items[0].digest.as_ref().unwrap().as_str(), "bb");
    }

    #[test]
    fn unknown_sizes_propagate_to_parents() {
        let obj = object("obj", 0, 1, FILES);
        let page = list(&obj, &req("", false), 100).unwrap();
        let z = &page.items[2];
        assert!(!z.has_size());
        let dir = &page.items[1];
        assert_eq!(dir.size, Some(9));
    }

    #[test]
    fn bad_paths_and_versions() {
        let obj = object("obj", 0, 2, FILES);
        assert!(matches!(list(&obj, &req("missing", false), 10), Err(QueryError::NotFound(_))));
        assert!(matches!(list(&obj, &req("../x", false), 10), Err(QueryError::InvalidArgument(_))));
        assert!(matches!(list(&obj, &req("/dir", false), 10), Err(QueryError::InvalidArgument(_))));

        let mut r = req("", false);
        r.version = "v3".into();
        assert!(matches!(list(&obj, &r, 10), Err(QueryError::NotFound(_))));
        r.version = "latest".into();
        assert!(matches!(list(&obj, &r, 10), Err(QueryError::InvalidArgument(_))));
        r.version = "v002".into();
        assert_eq!(list(&obj, &r, 10).unwrap().version.num(), 2);
        r.version = "HEAD".into();
        assert_eq!(list(&obj, &r, 10).unwrap().version.num(), 2);
    }

    #[test]
    fn cursor_is_bound_to_request() {
        let obj = object("obj", 0, 1, FILES);
        let first = list(&obj, &req("", true), 2).unwrap();
        let cursor = first.next_cursor.unwrap();

        let mut other_base = req("dir", true);
        other_base.cursor = cursor.clone();
        assert!(matches!(list(&obj, &other_base, 2), Err(QueryError::InvalidArgument(_))));

        let mut flat = req("", false);
        flat.cursor = cursor;
        assert!(matches!(list(&obj, &flat, 2), Err(QueryError::InvalidArgument(_))));

        let mut garbage = req("", true);
        garbage.cursor = "zz".into();
        assert!(matches!(list(&obj, &garbage, 2), Err(QueryError::InvalidArgument(_))));
    }

    #[test]
    fn head_cursor_stays_on_its_version() {
        let v1 = object("obj", 0, 1, FILES);
        let first = list(&v1, &req("", false), 1).unwrap();
        assert_eq!(first.version.num(), 1);

        let v2 = object("obj", 0, 2, FILES);
        let mut next = req("", false);
        next.cursor = first.next_cursor.unwrap();
        let second = list(&v2, &next, 1).unwrap();
        assert_eq!(second.version.num(), 1);
        assert_eq!(names(&second), ["dir"]);
    }
}
