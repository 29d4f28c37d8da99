//! Liveness monitoring for a connected client.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::hub::Client;

/// Shortest check period; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The peer stayed silent for the whole timeout window.
    TimedOut,
    /// The heartbeat was cancelled or the client closed.
    Cancelled,
}

/// Watch `client` for inbound activity.
///
/// Each `interval` tick reads and resets the client's alive flag. A tick with
/// no activity since the previous one counts as a miss; `timeout / interval`
/// consecutive misses (at least 1) end the loop with
/// [`HeartbeatResult::TimedOut`].
pub async fn run_heartbeat(
    client: Arc<Client>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let interval = interval.max(MIN_INTERVAL);
    let mut ticks = time::interval(interval);
    let interval_ms = interval.as_millis().max(1);
    let max_missed = u32::try_from((timeout.as_millis() / interval_ms).max(1)).unwrap_or(u32::MAX);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            () = client.closed() => return HeartbeatResult::Cancelled,
            _ = ticks.tick() => {
                if client.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
        }
    }
}
