//! Serialization boundary
//!
//! Every payload crossing the wire goes through a [`Serializer`]: a
//! swappable encode/decode pair between raw bytes and a structured
//! [`serde_json::Value`]. The registry takes one at construction time;
//! [`JsonSerializer`] is the default.

use serde_json::Value;

use crate::common::{SocketError, SocketResult};

/// Capability interface between structured payloads and wire bytes
pub trait Serializer: Send + Sync {
    /// Encode a structured value into wire bytes
    fn encode(&self, value: &Value) -> SocketResult<Vec<u8>>;

    /// Decode wire bytes back into a structured value
    fn decode(&self, bytes: &[u8]) -> SocketResult<Value>;
}

/// JSON wire encoding
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, value: &Value) -> SocketResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| SocketError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> SocketResult<Value> {
        serde_json::from_slice(bytes).map_err(|e| SocketError::Decode(e.to_string()))
    }
}
