//! HTTP server for the OCFL index.
//!
//! Serves two versioned RPC facades over one engine: `ocfl.v0.IndexService`
//! (read-only) and `ocfl.v1.IndexService` (adds indexing control and log
//! following). Unary methods take and return JSON; `GetContent` and
//! `FollowLogs` stream their response bodies.

pub mod config;
pub mod error;
pub mod handler;
pub mod messages;
pub mod router;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use router::build_router;
pub use server::OcflIndexServer;
pub use state::{AppState, SharedState};
