//! Read side of the OCFL index.
//!
//! [`QueryEngine`] answers listing, detail, version-state, and status
//! queries from an [`IndexStore`](ocfl_index::IndexStore) alone; it never
//! touches storage. [`ContentResolver`] maps a digest to a content path
//! through the index and only then opens the bytes from storage.

pub mod content;
pub mod engine;
pub mod error;
pub mod state;

pub use content::{ContentResolver, ContentStream, DEFAULT_CHUNK_SIZE};
pub use engine::{QueryConfig, QueryEngine, Status, Summary};
pub use error::{QueryError, QueryResult};
pub use state::{StatePage, StateRequest};
