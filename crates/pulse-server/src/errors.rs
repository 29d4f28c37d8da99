//! Error types for the hub and the streams it writes to.

use thiserror::Error;

/// Errors surfaced by [`Hub`](crate::hub::Hub) operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// The coordination loop has shut down; no more requests are accepted.
    #[error("hub is closed")]
    Closed,
    /// [`Hub::run`](crate::hub::Hub::run) was called a second time.
    #[error("hub coordination loop is already running")]
    AlreadyRunning,
    /// The broadcast message could not be serialized.
    #[error("failed to serialize broadcast message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure writing to one client's stream. Never leaves that client.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The transport reported a write failure.
    #[error("stream write failed: {0}")]
    Write(String),
}
