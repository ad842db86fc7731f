use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha512};

use ocfl_types::{
    ContentNode, Digest, DigestAlgorithm, IndexedObject, LogicalPath, Spec, User, VNum, Version,
};

use crate::error::{StorageError, StorageResult};

pub const INVENTORY_FILE: &str = "inventory.json";

/// The fields of an OCFL `inventory.json` that the index needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub digest_algorithm: String,
    pub head: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_directory: Option<String>,
    pub manifest: BTreeMap<String, Vec<String>>,
    pub versions: BTreeMap<String, InventoryVersion>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryVersion {
    pub created: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<InventoryUser>,
    pub state: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryUser {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Hash inventory bytes with a content algorithm.
pub fn digest_bytes(alg: DigestAlgorithm, bytes: &[u8]) -> StorageResult<Digest> {
    match alg {
        DigestAlgorithm::Sha512 => Ok(Digest::from_bytes(&Sha512::digest(bytes))),
        DigestAlgorithm::Sha256 => Ok(Digest::from_bytes(&Sha256::digest(bytes))),
        other => Err(StorageError::inventory(
            INVENTORY_FILE,
            format!("cannot compute {other} digests"),
        )),
    }
}

/// Parse the first token of a sidecar file (`<digest> inventory.json`).
pub fn parse_sidecar(path: &str, contents: &str) -> StorageResult<Digest> {
    let token = contents
        .split_whitespace()
        .next()
        .ok_or_else(|| StorageError::inventory(path, "empty sidecar file"))?;
    Ok(Digest::parse(token)?)
}

impl Inventory {
    /// Parse inventory JSON.
    pub fn from_slice(path: &str, bytes: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::inventory(path, e))
    }

    /// Validate the inventory and convert it to an indexed object.
    ///
    /// `root_path` is the object root relative to the storage root. `size_of`
    /// returns the stored size of a manifest content path, if known.
    pub fn into_object(
        self,
        root_path: &str,
        spec: Spec,
        size_of: impl Fn(&str) -> Option<u64>,
    ) -> StorageResult<IndexedObject> {
        let bad = |reason: String| StorageError::inventory(root_path, reason);

        if self.id.is_empty() {
            return Err(bad("missing object id".into()));
        }
        let alg: DigestAlgorithm = self.digest_algorithm.parse()?;
        if !alg.is_content_algorithm() {
            return Err(bad(format!("{alg} is not allowed as the inventory digest algorithm")));
        }
        let head: VNum = self.head.parse()?;

        let mut manifest: BTreeMap<Digest, Vec<String>> = BTreeMap::new();
        let mut sizes: BTreeMap<Digest, Option<u64>> = BTreeMap::new();
        for (raw, paths) in self.manifest {
            let digest = Digest::parse(&raw)?;
            let size = paths.first().and_then(|p| size_of(p));
            sizes.insert(digest.clone(), size);
            manifest.entry(digest).or_default().extend(paths);
        }

        let mut versions = Vec::with_capacity(self.versions.len());
        for (label, inv) in self.versions {
            let vnum: VNum = label.parse()?;
            let mut state = ContentNode::empty_dir();
            for (raw, paths) in inv.state {
                let digest = Digest::parse(&raw)?;
                let size = sizes.get(&digest).copied().flatten();
                for path in paths {
                    let logical = LogicalPath::parse(&path)?;
                    state.insert_file(&logical, digest.clone(), size)?;
                }
            }
            state.recompute_sizes();
            versions.push(Version {
                vnum,
                created: inv.created,
                message: inv.message.unwrap_or_default(),
                user: inv.user.map(|u| User {
                    name: u.name,
                    address: u.address,
                }),
                state,
            });
        }
        versions.sort_by_key(|v| v.vnum);

        match versions.last() {
            Some(last) if last.vnum == head => {}
            Some(last) => {
                return Err(bad(format!("head is {head} but the last version is {}", last.vnum)))
            }
            None => return Err(bad("inventory has no versions".into())),
        }

        Ok(IndexedObject::new(self.id, root_path, spec, alg, versions, manifest)?)
    }
}
