use async_trait::async_trait;
use tokio::io::AsyncRead;

use ocfl_types::{Digest, IndexedObject, Spec};

use crate::error::StorageResult;

/// An object root discovered in storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRoot {
    /// Path relative to the storage root, `/`-separated.
    pub path: String,
    /// Spec version from the object's declaration file.
    pub spec: Spec,
}

/// Storage root metadata read from its declaration and layout files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootDescription {
    pub spec: Spec,
    pub description: String,
    /// Storage layout extension name, if the root declares one.
    pub layout: Option<String>,
}

/// Result of resolving an id through the storage layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Located {
    /// An object root exists where the layout puts the id.
    Found(ObjectRoot),
    /// The layout maps the id to a path with no object there.
    Absent,
    /// The root has no layout that can map ids to paths.
    Unresolvable,
}

/// Enumerates the objects in a storage root.
///
/// Implementations must distinguish a storage root that cannot be read
/// (an `Err`) from one that is readable and empty. Callers delete index
/// entries based on what a walk does not yield, so a walk that cannot see
/// part of the tree must report an error rather than end early.
pub trait StorageWalker: Send + Sync {
    /// Display form of the storage root location.
    fn root_path(&self) -> String;

    /// Read the root's declaration and description.
    fn describe(&self) -> StorageResult<RootDescription>;

    /// Enumerate object roots without loading their content.
    ///
    /// Object roots are not descended into. An `Err` item means the walk
    /// could not see part of the tree.
    fn walk(&self) -> StorageResult<Box<dyn Iterator<Item = StorageResult<ObjectRoot>> + Send + '_>>;

    /// Resolve an object id to its root through the storage layout.
    fn locate(&self, id: &str) -> StorageResult<Located>;

    /// Check whether an object root exists at a known path.
    fn object_at(&self, path: &str) -> StorageResult<Option<ObjectRoot>>;
}

/// Parses object inventories.
pub trait InventoryReader: Send + Sync {
    /// The digest recorded in the inventory sidecar file.
    ///
    /// Cheap compared to [`read`](Self::read); used to skip objects whose
    /// inventory has not changed since they were last indexed.
    fn sidecar_digest(&self, root: &ObjectRoot) -> StorageResult<Digest>;

    /// Parse and validate the object's inventory.
    fn read(&self, root: &ObjectRoot) -> StorageResult<IndexedObject>;
}

/// A readable stream of stored bytes.
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Opens stored content for streaming.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Open the file at `path`, relative to the storage root.
    async fn open(&self, path: &str) -> StorageResult<ContentReader>;
}
