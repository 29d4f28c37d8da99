//! Per-client drain loop: the single writer for one stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info};

use super::client::{Client, Payload};
use super::registry::Hub;
use super::sink::MessageSink;
use crate::errors::StreamError;

/// Shortest ping period; `tokio::time::interval` rejects zero.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Why a drain loop stopped.
#[derive(Debug)]
pub enum DrainExit {
    /// The client was closed (evicted, disconnected, or shutdown).
    Cancelled,
    /// Writing to the stream failed.
    StreamFailed(StreamError),
}

/// Write queued payloads to `sink` in order until the client closes or a
/// write fails.
///
/// With `ping_interval` set, a ping is written whenever the interval elapses.
/// On exit the client is removed from `hub` (a no-op if it is already gone),
/// anything still queued is discarded, the sink is closed, and the client
/// ends in [`ClientState::Closed`](super::client::ClientState::Closed).
pub async fn run_drain_loop<S: MessageSink>(
    client: Arc<Client>,
    mut rx: mpsc::Receiver<Payload>,
    mut sink: S,
    hub: Arc<Hub>,
    ping_interval: Option<Duration>,
) -> DrainExit {
    let mut pings = ping_interval.map(|period| {
        let period = period.max(MIN_PING_INTERVAL);
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let exit = loop {
        tokio::select! {
            biased;
            () = client.closed() => break DrainExit::Cancelled,
            next = rx.recv() => {
                let Some(payload) = next else { break DrainExit::Cancelled };
                tokio::select! {
                    biased;
                    () = client.closed() => break DrainExit::Cancelled,
                    written = sink.send(payload) => {
                        if let Err(e) = written {
                            break DrainExit::StreamFailed(e);
                        }
                    }
                }
            }
            () = next_tick(&mut pings) => {
                tokio::select! {
                    biased;
                    () = client.closed() => break DrainExit::Cancelled,
                    pinged = sink.ping() => {
                        if let Err(e) = pinged {
                            break DrainExit::StreamFailed(e);
                        }
                    }
                }
            }
        }
    };

    match &exit {
        DrainExit::Cancelled => debug!(client_id = %client.id(), "drain loop cancelled"),
        DrainExit::StreamFailed(e) => {
            info!(client_id = %client.id(), error = %e, "stream write failed, closing client");
        }
    }

    let _ = client.close();
    hub.unregister_and_wait(&client).await;

    rx.close();
    let mut discarded = 0usize;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        debug!(client_id = %client.id(), discarded, "discarded queued messages");
    }

    sink.close().await;
    client.mark_closed();
    exit
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::client::ClientState;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Records writes; fails every write after `fail_after` successes.
    #[derive(Clone, Default)]
    struct RecordingSink {
        written: Arc<Mutex<Vec<String>>>,
        pings: Arc<Mutex<usize>>,
        closed: Arc<Mutex<bool>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&mut self, payload: Payload) -> Result<(), StreamError> {
            let mut written = self.written.lock();
            if self.fail_after.is_some_and(|n| written.len() >= n) {
                return Err(StreamError::Write("peer reset".into()));
            }
            written.push(payload.to_string());
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), StreamError> {
            *self.pings.lock() += 1;
            Ok(())
        }

        async fn close(&mut self) {
            *self.closed.lock() = true;
        }
    }

    /// Never completes a write.
    struct StuckSink;

    #[async_trait]
    impl MessageSink for StuckSink {
        async fn send(&mut self, _payload: Payload) -> Result<(), StreamError> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    fn start_hub() -> (Arc<Hub>, CancellationToken) {
        let hub = Arc::new(Hub::new());
        let cancel = CancellationToken::new();
        let runner = hub.clone();
        let token = cancel.clone();
        drop(tokio::spawn(async move { runner.run(token).await }));
        (hub, cancel)
    }

    async fn settle(hub: &Hub) {
        let (marker, _rx) = Client::channel(1);
        hub.unregister_and_wait(&marker).await;
    }

    #[tokio::test]
    async fn writes_in_enqueue_order() {
        let (hub, _cancel) = start_hub();
        let (client, rx) = Client::channel(8);
        let sink = RecordingSink::default();
        hub.register(client.clone()).unwrap();
        let drain = tokio::spawn(run_drain_loop(
            client.clone(),
            rx,
            sink.clone(),
            hub.clone(),
            None,
        ));
        settle(&hub).await;

        for m in ["m1", "m2", "m3"] {
            let _ = hub.broadcast(m, None).unwrap();
        }
        while sink.written.lock().len() < 3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*sink.written.lock(), vec!["\"m1\"", "\"m2\"", "\"m3\""]);

        hub.unregister(&client);
        assert_matches!(drain.await.unwrap(), DrainExit::Cancelled);
        assert_eq!(client.state(), ClientState::Closed);
        assert!(*sink.closed.lock());
    }

    #[tokio::test]
    async fn write_failure_unregisters_client() {
        let (hub, _cancel) = start_hub();
        let (client, rx) = Client::channel(8);
        let sink = RecordingSink {
            fail_after: Some(1),
            ..RecordingSink::default()
        };
        hub.register(client.clone()).unwrap();
        let drain = tokio::spawn(run_drain_loop(
            client.clone(),
            rx,
            sink.clone(),
            hub.clone(),
            None,
        ));
        settle(&hub).await;
        assert!(hub.contains(client.id()));

        let _ = hub.broadcast("ok", None).unwrap();
        let _ = hub.broadcast("boom", None).unwrap();

        assert_matches!(drain.await.unwrap(), DrainExit::StreamFailed(_));
        assert!(!hub.contains(client.id()));
        assert_eq!(client.state(), ClientState::Closed);
        assert_eq!(*sink.written.lock(), vec!["\"ok\""]);
        assert!(*sink.closed.lock());
    }

    #[tokio::test]
    async fn close_interrupts_blocked_write() {
        let (hub, _cancel) = start_hub();
        let (client, rx) = Client::channel(8);
        hub.register(client.clone()).unwrap();
        let drain = tokio::spawn(run_drain_loop(client.clone(), rx, StuckSink, hub.clone(), None));
        settle(&hub).await;

        let _ = hub.broadcast("stuck", None).unwrap();
        let _ = hub.broadcast("queued", None).unwrap();
        tokio::task::yield_now().await;

        hub.unregister(&client);
        assert_matches!(drain.await.unwrap(), DrainExit::Cancelled);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn hub_shutdown_ends_drain_loop() {
        let (hub, cancel) = start_hub();
        let (client, rx) = Client::channel(8);
        let sink = RecordingSink::default();
        hub.register(client.clone()).unwrap();
        let drain = tokio::spawn(run_drain_loop(
            client.clone(),
            rx,
            sink.clone(),
            hub.clone(),
            None,
        ));
        settle(&hub).await;

        cancel.cancel();
        assert_matches!(drain.await.unwrap(), DrainExit::Cancelled);
        assert_eq!(client.state(), ClientState::Closed);
        assert!(*sink.closed.lock());
    }

    #[tokio::test(start_paused = true)]
    async fn pings_on_interval() {
        let (hub, _cancel) = start_hub();
        let (client, rx) = Client::channel(8);
        let sink = RecordingSink::default();
        hub.register(client.clone()).unwrap();
        let drain = tokio::spawn(run_drain_loop(
            client.clone(),
            rx,
            sink.clone(),
            hub.clone(),
            Some(Duration::from_secs(10)),
        ));
        settle(&hub).await;

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(*sink.pings.lock(), 3);

        hub.unregister(&client);
        let _ = drain.await.unwrap();
    }

    /// Accepts payloads but never completes a ping.
    #[derive(Clone, Default)]
    struct StuckPingSink {
        closed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl MessageSink for StuckPingSink {
        async fn send(&mut self, _payload: Payload) -> Result<(), StreamError> {
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), StreamError> {
            std::future::pending().await
        }

        async fn close(&mut self) {
            *self.closed.lock() = true;
        }
    }

    #[tokio::test]
    async fn close_interrupts_blocked_ping() {
        let (hub, _cancel) = start_hub();
        let (client, rx) = Client::channel(8);
        let sink = StuckPingSink::default();
        hub.register(client.clone()).unwrap();
        let drain = tokio::spawn(run_drain_loop(
            client.clone(),
            rx,
            sink.clone(),
            hub.clone(),
            Some(Duration::from_millis(10)),
        ));
        settle(&hub).await;

        // Let the first ping start and stall.
        tokio::time::sleep(Duration::from_millis(50)).await;
        hub.unregister(&client);

        let exit = tokio::time::timeout(Duration::from_secs(5), drain)
            .await
            .expect("drain loop stuck in ping")
            .unwrap();
        assert_matches!(exit, DrainExit::Cancelled);
        assert_eq!(client.state(), ClientState::Closed);
        assert!(!hub.contains(client.id()));
        assert!(*sink.closed.lock());
    }

    #[tokio::test]
    async fn close_interrupts_blocked_write_with_pings_enabled() {
        let (hub, _cancel) = start_hub();
        let (client, rx) = Client::channel(8);
        hub.register(client.clone()).unwrap();
        let drain = tokio::spawn(run_drain_loop(
            client.clone(),
            rx,
            StuckSink,
            hub.clone(),
            Some(Duration::from_millis(10)),
        ));
        settle(&hub).await;

        let _ = hub.broadcast("stuck", None).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        hub.unregister(&client);

        let exit = tokio::time::timeout(Duration::from_secs(5), drain)
            .await
            .expect("drain loop stuck in write")
            .unwrap();
        assert_matches!(exit, DrainExit::Cancelled);
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ping_interval_does_not_panic() {
        let (hub, _cancel) = start_hub();
        let (client, rx) = Client::channel(8);
        let sink = RecordingSink::default();
        hub.register(client.clone()).unwrap();
        let drain = tokio::spawn(run_drain_loop(
            client.clone(),
            rx,
            sink.clone(),
            hub.clone(),
            Some(Duration::ZERO),
        ));
        settle(&hub).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(*sink.pings.lock() > 0);

        hub.unregister(&client);
        assert_matches!(drain.await.unwrap(), DrainExit::Cancelled);
    }
}
