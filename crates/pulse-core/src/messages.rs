//! Envelope for messages pushed to WebSocket clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sent once to a client right after its connection is accepted.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";

/// Broadcast whenever a post is created.
pub const POST_CREATED: &str = "Post_Created";

/// A typed message with an arbitrary JSON payload.
///
/// Serialized as `{"type": "...", "payload": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Message kind, e.g. [`POST_CREATED`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body.
    pub payload: Value,
}

impl WireMessage {
    /// Build an envelope from any serializable payload.
    pub fn new(kind: impl Into<String>, payload: impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            kind: kind.into(),
            payload: serde_json::to_value(payload)?,
        })
    }
}
