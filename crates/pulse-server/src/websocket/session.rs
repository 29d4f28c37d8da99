//! WebSocket session lifecycle: one connected peer from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use metrics::{counter, histogram};
use pulse_core::WireMessage;
use pulse_core::messages::CONNECTION_ESTABLISHED;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::sink::WsSink;
use crate::hub::{Client, Enqueued, Hub, MessageSink, Payload, run_drain_loop};
use crate::metrics::{
    HEARTBEAT_TIMEOUTS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Per-connection knobs taken from [`ServerConfig`](crate::config::ServerConfig).
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Capacity of the client's outbound queue.
    pub queue_capacity: usize,
    /// Ping and liveness-check period.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before the client is dropped.
    pub heartbeat_timeout: Duration,
}

/// Serialized `connection.established` envelope for `client`.
pub fn connection_established(client: &Client) -> serde_json::Result<Payload> {
    let message = WireMessage::new(CONNECTION_ESTABLISHED, json!({ "clientId": client.id() }))?;
    Ok(Payload::from(serde_json::to_string(&message)?))
}

/// Unregister `client` from `hub` once it stays silent for the heartbeat
/// timeout.
pub async fn watch_liveness(
    client: Arc<Client>,
    hub: Arc<Hub>,
    config: SessionConfig,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let result = run_heartbeat(
        client.clone(),
        config.heartbeat_interval,
        config.heartbeat_timeout,
        cancel,
    )
    .await;
    if result == HeartbeatResult::TimedOut {
        warn!(
            silent_for = ?client.last_pong_elapsed(),
            "client unresponsive, disconnecting"
        );
        counter!(HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
        hub.unregister(&client);
    }
    result
}

/// Run a WebSocket session for a freshly upgraded socket.
///
/// 1. Queues a `connection.established` envelope carrying the client ID
/// 2. Registers the client with the hub and starts its drain loop
/// 3. Watches liveness and unregisters silent peers
/// 4. Reads inbound frames until the peer leaves or the client is closed
/// 5. Unregisters and waits for the drain loop to release the socket
#[instrument(skip_all, fields(client_id = tracing::field::Empty))]
pub async fn run_ws_session(ws: WebSocket, hub: Arc<Hub>, config: SessionConfig) {
    let (ws_tx, mut ws_rx) = ws.split();
    let mut sink = WsSink::new(ws_tx);
    let (client, rx) = Client::channel(config.queue_capacity);
    let _ = tracing::Span::current().record("client_id", client.id().as_str());

    let connection_start = Instant::now();
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!("client connected");

    match connection_established(&client) {
        Ok(payload) => {
            if client.enqueue(payload) != Enqueued::Queued {
                debug!("connection.established not queued");
            }
        }
        Err(e) => warn!(error = %e, "failed to build connection.established"),
    }

    if let Err(e) = hub.register(client.clone()) {
        info!(error = %e, "hub rejected registration, closing socket");
        let _ = client.close();
        sink.close().await;
        client.mark_closed();
        return;
    }

    let drain = tokio::spawn(run_drain_loop(
        client.clone(),
        rx,
        sink,
        hub.clone(),
        Some(config.heartbeat_interval),
    ));

    let heartbeat_cancel = CancellationToken::new();
    let heartbeat = tokio::spawn(watch_liveness(
        client.clone(),
        hub.clone(),
        config,
        heartbeat_cancel.clone(),
    ));

    loop {
        tokio::select! {
            () = client.closed() => {
                debug!("client closed by hub");
                break;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Close(_))) => {
                    info!("client sent close frame");
                    break;
                }
                Some(Ok(_)) => client.mark_alive(),
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
                None => break,
            },
        }
    }

    hub.unregister(&client);
    if let Err(e) = drain.await {
        warn!(error = %e, "drain task failed");
    }
    heartbeat_cancel.cancel();
    let _ = heartbeat.await;

    info!(dropped = client.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    // Full sessions need a real socket; see tests/integration.rs.
    use super::*;
    use crate::errors::StreamError;
    use crate::hub::{ClientState, DrainExit};
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    /// A peer that stopped reading: every write stalls.
    struct FrozenSink;

    #[async_trait]
    impl MessageSink for FrozenSink {
        async fn send(&mut self, _payload: Payload) -> Result<(), StreamError> {
            std::future::pending().await
        }

        async fn ping(&mut self) -> Result<(), StreamError> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn silent_peer_with_stalled_writes_is_released() {
        let hub = Arc::new(Hub::new());
        let shutdown = CancellationToken::new();
        drop(tokio::spawn({
            let hub = hub.clone();
            let shutdown = shutdown.clone();
            async move { hub.run(shutdown).await }
        }));

        let config = SessionConfig {
            queue_capacity: 4,
            heartbeat_interval: Duration::from_millis(10),
            heartbeat_timeout: Duration::from_millis(30),
        };
        let (client, rx) = Client::channel(config.queue_capacity);
        hub.register(client.clone()).unwrap();
        let drain = tokio::spawn(run_drain_loop(
            client.clone(),
            rx,
            FrozenSink,
            hub.clone(),
            Some(config.heartbeat_interval),
        ));
        let _ = hub.broadcast("never written", None).unwrap();

        let liveness = watch_liveness(
            client.clone(),
            hub.clone(),
            config,
            CancellationToken::new(),
        );
        let result = tokio::time::timeout(Duration::from_secs(5), liveness)
            .await
            .expect("heartbeat never fired");
        assert_eq!(result, HeartbeatResult::TimedOut);

        let exit = tokio::time::timeout(Duration::from_secs(5), drain)
            .await
            .expect("drain loop never released the stream")
            .unwrap();
        assert_matches!(exit, DrainExit::Cancelled);
        assert_eq!(client.state(), ClientState::Closed);
        assert!(!hub.contains(client.id()));
        shutdown.cancel();
    }

    #[test]
    fn established_envelope_carries_client_id() {
        let (client, _rx) = Client::channel(1);
        let payload = connection_established(&client).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "connection.established");
        assert_eq!(value["payload"]["clientId"], client.id().as_str());
    }
}
