//! Read-only access to an OCFL storage root.
//!
//! The index never writes to storage. This crate provides the three
//! capabilities the indexing engine consumes:
//!
//! - [`StorageWalker`]: describe the root, enumerate object roots, and
//!   locate an object by id through the root's storage layout
//! - [`InventoryReader`]: parse an object's `inventory.json` into an
//!   [`IndexedObject`](ocfl_types::IndexedObject)
//! - [`ContentSource`]: open stored content files for streaming
//!
//! [`FsStorage`] implements all three over a local directory;
//! [`InMemoryStorage`] is a deterministic fake for tests.

pub mod error;
pub mod fs;
pub mod inventory;
pub mod layout;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use fs::{FsStorage, FsStorageConfig};
pub use inventory::Inventory;
pub use layout::StorageLayout;
pub use memory::InMemoryStorage;
pub use traits::{
    ContentReader, ContentSource, InventoryReader, Located, ObjectRoot, RootDescription,
    StorageWalker,
};
