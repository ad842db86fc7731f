//! Index store for OCFL objects.
//!
//! The index is the only shared mutable state in the service. Indexing jobs
//! write through [`IndexStore::upsert`] and [`IndexStore::delete`]; queries
//! read through [`IndexStore::get`], [`IndexStore::scan`], and
//! [`IndexStore::resolve_digest`]. Every operation is atomic for a single
//! object id. Scans are not snapshots: a concurrent write may or may not be
//! visible to the remaining pages of a listing, but a cursor never causes an
//! unchanged object to be skipped or repeated.
//!
//! # Key Types
//!
//! - [`IndexStore`]: the store contract
//! - [`ShardedIndex`]: in-memory store with per-shard locks
//! - [`PersistentIndex`]: a [`ShardedIndex`] backed by an [`IndexLog`]
//! - [`ObjectSort`]: sort field and direction for scans
//! - [`Page`]: one page of results plus the cursor for the next

pub mod cursor;
pub mod error;
pub mod log;
pub mod persistent;
pub mod sharded;
pub mod sort;
pub mod traits;

pub use cursor::{decode_cursor, encode_cursor};
pub use error::{IndexError, IndexResult};
pub use log::{IndexLog, LogConfig, LogRecord, SyncMode};
pub use persistent::PersistentIndex;
pub use sharded::ShardedIndex;
pub use sort::{ObjectSort, SortField, SortOrder};
pub use traits::{IndexStore, Page};
