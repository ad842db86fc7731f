use std::fmt;

use crate::error::TypeError;

/// A cleaned, relative path inside a version's logical state.
///
/// Empty segments and `.` are dropped; `..` and absolute paths are rejected
/// rather than resolved, so a path can never escape the version root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalPath {
    segments: Vec<String>,
}

impl LogicalPath {
    /// The version root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Clean a client-supplied path. `""` and `"."` resolve to the root.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        if raw.starts_with('/') {
            return Err(TypeError::InvalidPath {
                path: raw.to_string(),
                reason: "path must be relative".into(),
            });
        }
        let mut segments = Vec::new();
        for seg in raw.split('/') {
            match seg {
                "" | "." => continue,
                ".." => {
                    return Err(TypeError::InvalidPath {
                        path: raw.to_string(),
                        reason: "path must not contain '..'".into(),
                    })
                }
                s => segments.push(s.to_string()),
            }
        }
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_forms() {
        for raw in ["", ".", "./", ".//."] {
            assert!(LogicalPath::parse(raw).unwrap().is_root(), "{raw}");
        }
    }

    #[test]
    fn cleans_redundant_segments() {
        let p = LogicalPath::parse("a//./b/").unwrap();
        assert_eq!(p.segments(), &["a".to_string(), "b".to_string()]);
        assert_eq!(p.to_string(), "a/b");
        assert_eq!(p.file_name(), Some("b"));
    }

    #[test]
    fn rejects_escapes() {
        assert!(LogicalPath::parse("/etc/passwd").is_err());
        assert!(LogicalPath::parse("a/../b").is_err());
        assert!(LogicalPath::parse("..").is_err());
    }

    #[test]
    fn ordering_follows_segments() {
        // Segment-wise ordering puts a directory's contents before a sibling
        // whose name sorts after the directory name.
        let a_b = LogicalPath::parse("a/b").unwrap();
        let a_dash = LogicalPath::parse("a-c").unwrap();
        assert!(a_b < a_dash);
        assert!(LogicalPath::root().join("a") < a_b);
    }
}
