use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::{Digest, DigestAlgorithm};
use crate::error::TypeError;
use crate::spec::Spec;
use crate::version::Version;
use crate::vnum::VNum;

/// An OCFL object as held by the index.
///
/// Constructed through [`IndexedObject::new`], which enforces that the
/// version history is non-empty, numbered `v1..vN` without gaps and with
/// uniform padding, and that
/// every file in every state has a manifest entry. The head is always the
/// last version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIndexedObject")]
pub struct IndexedObject {
    id: String,
    root_path: String,
    spec: Spec,
    digest_algorithm: DigestAlgorithm,
    inventory_digest: Option<Digest>,
    versions: Vec<Version>,
    /// Content paths (relative to the object root) for each digest.
    manifest: BTreeMap<Digest, Vec<String>>,
}

impl IndexedObject {
    pub fn new(
        id: impl Into<String>,
        root_path: impl Into<String>,
        spec: Spec,
        digest_algorithm: DigestAlgorithm,
        versions: Vec<Version>,
        manifest: BTreeMap<Digest, Vec<String>>,
    ) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::InvalidObject("object id is empty".into()));
        }
        if versions.is_empty() {
            return Err(TypeError::InvalidObject(format!("{id}: no versions")));
        }
        for (i, v) in versions.iter().enumerate() {
            if v.vnum.num() as usize != i + 1 {
                return Err(TypeError::InvalidObject(format!(
                    "{id}: expected version {} at position {i}, found {}",
                    i + 1,
                    v.vnum
                )));
            }
            if v.vnum.padding() != versions[0].vnum.padding() {
                return Err(TypeError::InvalidObject(format!(
                    "{id}: inconsistent version padding at {}",
                    v.vnum
                )));
            }
            if let Some(missing) = v.state.file_digests().find(|d| !manifest.contains_key(*d)) {
                return Err(TypeError::InvalidObject(format!(
                    "{id}: {} state references digest {missing} missing from manifest",
                    v.vnum
                )));
            }
        }
        Ok(Self {
            id,
            root_path: root_path.into(),
            spec,
            digest_algorithm,
            inventory_digest: None,
            versions,
            manifest,
        })
    }

    /// Record the inventory sidecar digest this object was read from.
    pub fn with_inventory_digest(mut self, digest: Digest) -> Self {
        self.inventory_digest = Some(digest);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Object root, relative to the storage root, `/`-separated.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn spec(&self) -> Spec {
        self.spec
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn inventory_digest(&self) -> Option<&Digest> {
        self.inventory_digest.as_ref()
    }

    /// Version history in ascending order. Never empty.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn manifest(&self) -> &BTreeMap<Digest, Vec<String>> {
        &self.manifest
    }

    pub fn head(&self) -> &Version {
        // `new` rejects an empty history.
        &self.versions[self.versions.len() - 1]
    }

    pub fn first(&self) -> &Version {
        &self.versions[0]
    }

    /// Find a version by number, ignoring label padding.
    pub fn version(&self, vnum: &VNum) -> Option<&Version> {
        let idx = (vnum.num() as usize).checked_sub(1)?;
        self.versions.get(idx)
    }

    /// Path of the stored bytes for `digest`, relative to the storage root.
    pub fn content_path(&self, digest: &Digest) -> Option<String> {
        let path = self.manifest.get(digest)?.first()?;
        if self.root_path.is_empty() {
            Some(path.clone())
        } else {
            Some(format!("{}/{}", self.root_path, path))
        }
    }

    pub fn summary(&self) -> ObjectSummary {
        ObjectSummary {
            id: self.id.clone(),
            head: self.head().vnum,
            v1_created: self.first().created,
            head_created: self.head().created,
            root_path: self.root_path.clone(),
            spec: self.spec,
        }
    }
}

/// Serialized form of [`IndexedObject`]; decoding goes through
/// [`IndexedObject::new`] so stored records are checked like fresh ones.
#[derive(Deserialize)]
struct RawIndexedObject {
    id: String,
    root_path: String,
    spec: Spec,
    digest_algorithm: DigestAlgorithm,
    inventory_digest: Option<Digest>,
    versions: Vec<Version>,
    manifest: BTreeMap<Digest, Vec<String>>,
}

impl TryFrom<RawIndexedObject> for IndexedObject {
    type Error = TypeError;

    fn try_from(raw: RawIndexedObject) -> Result<Self, Self::Error> {
        let mut object = Self::new(
            raw.id,
            raw.root_path,
            raw.spec,
            raw.digest_algorithm,
            raw.versions,
            raw.manifest,
        )?;
        object.inventory_digest = raw.inventory_digest;
        Ok(object)
    }
}

/// Listing entry for an object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub id: String,
    pub head: VNum,
    pub v1_created: DateTime<FixedOffset>,
    pub head_created: DateTime<FixedOffset>,
    pub root_path: String,
    pub spec: Spec,
}

/// Where the bytes for a digest live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLocation {
    pub object_id: String,
    /// Path relative to the storage root.
    pub path: String,
}

/// Metadata about the indexed storage root.
///
/// Replaced only when a full indexing run completes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRootInfo {
    pub root_path: String,
    pub spec: Option<Spec>,
    pub description: String,
    pub indexed_at: Option<DateTime<Utc>>,
}
