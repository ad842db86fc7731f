use serde::Deserialize;
use sha2::{Digest as _, Sha256, Sha512};

use ocfl_types::DigestAlgorithm;

use crate::error::{StorageError, StorageResult};

pub const FLAT_DIRECT: &str = "0002-flat-direct-storage-layout";
pub const HASHED_N_TUPLE: &str = "0004-hashed-n-tuple-storage-layout";

/// Maps object ids to object root paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageLayout {
    /// The id is the object root directory name.
    FlatDirect,
    /// The id's digest is split into tuples of directories.
    HashedNTuple {
        digest_algorithm: DigestAlgorithm,
        tuple_size: usize,
        number_of_tuples: usize,
        short_object_root: bool,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HashedNTupleConfig {
    digest_algorithm: Option<String>,
    tuple_size: Option<usize>,
    number_of_tuples: Option<usize>,
    short_object_root: Option<bool>,
}

impl StorageLayout {
    /// Build a layout from its extension name and optional `config.json`.
    ///
    /// Returns `Ok(None)` for extensions this crate does not implement.
    pub fn from_extension(name: &str, config: Option<&[u8]>) -> StorageResult<Option<Self>> {
        match name {
            FLAT_DIRECT => Ok(Some(Self::FlatDirect)),
            HASHED_N_TUPLE => {
                let cfg: HashedNTupleConfig = match config {
                    Some(bytes) => serde_json::from_slice(bytes)
                        .map_err(|e| StorageError::Layout(format!("{name} config: {e}")))?,
                    None => HashedNTupleConfig::default(),
                };
                let digest_algorithm = match cfg.digest_algorithm.as_deref() {
                    None => DigestAlgorithm::Sha256,
                    Some(alg) => alg.parse()?,
                };
                if !digest_algorithm.is_content_algorithm() {
                    return Err(StorageError::Layout(format!(
                        "{name}: unsupported digest algorithm {digest_algorithm}"
                    )));
                }
                let layout = Self::HashedNTuple {
                    digest_algorithm,
                    tuple_size: cfg.tuple_size.unwrap_or(3),
                    number_of_tuples: cfg.number_of_tuples.unwrap_or(3),
                    short_object_root: cfg.short_object_root.unwrap_or(false),
                };
                layout.check()?;
                Ok(Some(layout))
            }
            _ => Ok(None),
        }
    }

    fn check(&self) -> StorageResult<()> {
        if let Self::HashedNTuple {
            digest_algorithm,
            tuple_size,
            number_of_tuples,
            short_object_root,
        } = self
        {
            if (*tuple_size == 0) != (*number_of_tuples == 0) {
                return Err(StorageError::Layout(
                    "tupleSize and numberOfTuples must both be zero or both non-zero".into(),
                ));
            }
            let used = tuple_size * number_of_tuples;
            let len = digest_algorithm.hex_len();
            if used > len || (*short_object_root && used == len) {
                return Err(StorageError::Layout(format!(
                    "{number_of_tuples} tuples of {tuple_size} exceed a {len}-character digest"
                )));
            }
        }
        Ok(())
    }

    /// Object root path for `id`, relative to the storage root.
    pub fn path_for(&self, id: &str) -> StorageResult<String> {
        if id.is_empty() {
            return Err(StorageError::Layout("empty object id".into()));
        }
        match self {
            Self::FlatDirect => {
                if id.contains('/') || id == "." || id == ".." {
                    return Err(StorageError::Layout(format!(
                        "id {id:?} is not a valid directory name"
                    )));
                }
                Ok(id.to_string())
            }
            Self::HashedNTuple {
                digest_algorithm,
                tuple_size,
                number_of_tuples,
                short_object_root,
            } => {
                let digest = match digest_algorithm {
                    DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(id.as_bytes())),
                    _ => hex::encode(Sha256::digest(id.as_bytes())),
                };
                let used = tuple_size * number_of_tuples;
                let mut parts: Vec<&str> = (0..*number_of_tuples)
                    .map(|i| &digest[i * tuple_size..(i + 1) * tuple_size])
                    .collect();
                if *short_object_root {
                    parts.push(&digest[used..]);
                } else {
                    parts.push(&digest);
                }
                Ok(parts.join("/"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_direct_uses_id() {
        let layout = StorageLayout::from_extension(FLAT_DIRECT, None).unwrap().unwrap();
        assert_eq!(layout.path_for("object-01").unwrap(), "object-01");
        assert!(layout.path_for("a/b").is_err());
        assert!(layout.path_for("..").is_err());
    }

    #[test]
    fn hashed_n_tuple_defaults() {
        let layout = StorageLayout::from_extension(HASHED_N_TUPLE, None)
            .unwrap()
            .unwrap();
        // Published example for the default configuration.
        assert_eq!(
            layout.path_for("object-01").unwrap(),
            "3c0/ff4/240/3c0ff4240c1e116dba14c7627f2319b58aa3d77606d0d90dfc6161608ac987d4"
        );
    }

    #[test]
    fn hashed_n_tuple_short_root() {
        let config = br#"{"digestAlgorithm":"sha256","tupleSize":3,"numberOfTuples":3,"shortObjectRoot":true}"#;
        let layout = StorageLayout::from_extension(HASHED_N_TUPLE, Some(config))
            .unwrap()
            .unwrap();
        assert_eq!(
            layout.path_for("object-01").unwrap(),
            "3c0/ff4/240/c1e116dba14c7627f2319b58aa3d77606d0d90dfc6161608ac987d4"
        );
    }

    #[test]
    fn hashed_n_tuple_without_tuples() {
        let config = br#"{"tupleSize":0,"numberOfTuples":0}"#;
        let layout = StorageLayout::from_extension(HASHED_N_TUPLE, Some(config))
            .unwrap()
            .unwrap();
        assert_eq!(
            layout.path_for("object-01").unwrap(),
            "3c0ff4240c1e116dba14c7627f2319b58aa3d77606d0d90dfc6161608ac987d4"
        );
    }

    #[test]
    fn rejects_bad_config() {
        let config = br#"{"tupleSize":0,"numberOfTuples":2}"#;
        assert!(StorageLayout::from_extension(HASHED_N_TUPLE, Some(config)).is_err());
        let config = br#"{"digestAlgorithm":"md5"}"#;
        assert!(StorageLayout::from_extension(HASHED_N_TUPLE, Some(config)).is_err());
    }

    #[test]
    fn unknown_extension() {
        assert_eq!(
            StorageLayout::from_extension("0003-hash-and-id-n-tuple-storage-layout", None).unwrap(),
            None
        );
    }
}
