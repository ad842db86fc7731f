//! Opaque pagination cursors.
//!
//! A cursor is any serializable position, rendered as hex-encoded JSON so
//! clients treat it as an opaque token.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{IndexError, IndexResult};

/// Encode a cursor position as an opaque token.
pub fn encode_cursor<T: Serialize>(position: &T) -> IndexResult<String> {
    let json = serde_json::to_vec(position).map_err(|e| IndexError::Serialization(e.to_string()))?;
    Ok(hex::encode(json))
}

/// Decode a token produced by [`encode_cursor`].
pub fn decode_cursor<T: DeserializeOwned>(token: &str) -> IndexResult<T> {
    let json = hex::decode(token).map_err(|e| IndexError::InvalidCursor(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| IndexError::InvalidCursor(e.to_string()))
}
