use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid version number: {0}")]
    InvalidVersion(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("unsupported digest algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("invalid OCFL spec version: {0}")]
    InvalidSpec(String),

    #[error("invalid logical path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("logical path conflict at {0:?}")]
    PathConflict(String),

    #[error("invalid object: {0}")]
    InvalidObject(String),
}
