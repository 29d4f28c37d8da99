//! [`MessageSink`] over the write half of an axum WebSocket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;

use crate::errors::StreamError;
use crate::hub::{MessageSink, Payload};

/// Writes payloads as Text frames.
pub struct WsSink(SplitSink<WebSocket, Message>);

impl WsSink {
    /// Wrap the write half of a split socket.
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self(inner)
    }
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, payload: Payload) -> Result<(), StreamError> {
        self.0
            .send(Message::Text(payload.as_ref().into()))
            .await
            .map_err(|e| StreamError::Write(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), StreamError> {
        self.0
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| StreamError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.send(Message::Close(None)).await;
        let _ = self.0.close().await;
    }
}
