//! Write half of a duplex stream, as consumed by the drain loop.

use async_trait::async_trait;

use super::client::Payload;
use crate::errors::StreamError;

/// Destination for one client's outbound payloads.
///
/// The hub never reads from a stream; read halves stay with whoever
/// accepted the connection.
#[async_trait]
pub trait MessageSink: Send {
    /// Write one serialized payload.
    async fn send(&mut self, payload: Payload) -> Result<(), StreamError>;

    /// Write a transport-level liveness ping, if the transport has one.
    async fn ping(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    /// Release the stream. Errors are ignored; the client is going away.
    async fn close(&mut self);
}
