//! Foundation types for the OCFL index.
//!
//! This crate provides the value types shared by every other crate in the
//! workspace: how an indexed object, its versions, and the logical content
//! tree of each version are represented once an inventory has been read.
//!
//! # Key Types
//!
//! - [`VNum`]: OCFL version number (`v1`, `v002`, ...)
//! - [`Digest`] / [`DigestAlgorithm`]: content digests as lowercase hex
//! - [`Spec`]: OCFL specification version (`1.0`, `1.1`)
//! - [`Version`] / [`User`]: one immutable object version
//! - [`ContentNode`] / [`ContentItem`]: logical state tree and its listing form
//! - [`IndexedObject`] / [`ObjectSummary`]: an object as held by the index
//! - [`StorageRootInfo`]: metadata about the indexed storage root

pub mod digest;
pub mod error;
pub mod object;
pub mod path;
pub mod spec;
pub mod tree;
pub mod version;
pub mod vnum;

pub use digest::{Digest, DigestAlgorithm};
pub use error::TypeError;
pub use object::{ContentLocation, IndexedObject, ObjectSummary, StorageRootInfo};
pub use path::LogicalPath;
pub use spec::Spec;
pub use tree::{ContentItem, ContentNode};
pub use version::{User, Version};
pub use vnum::VNum;
