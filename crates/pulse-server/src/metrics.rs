//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Build a handle without touching the global recorder (tests, embedding).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "pulse_ws_connections_total";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "pulse_ws_disconnections_total";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "pulse_ws_connection_duration_seconds";
/// Clients currently in the registered set (gauge).
pub const CLIENTS_REGISTERED: &str = "pulse_clients_registered";
/// Broadcast calls (counter).
pub const BROADCASTS_TOTAL: &str = "pulse_broadcasts_total";
/// Per-recipient messages dropped on a full queue (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "pulse_broadcast_drops_total";
/// Clients evicted for dropping too many messages (counter).
pub const SLOW_CLIENT_EVICTIONS_TOTAL: &str = "pulse_slow_client_evictions_total";
/// Clients disconnected by the heartbeat monitor (counter).
pub const HEARTBEAT_TIMEOUTS_TOTAL: &str = "pulse_heartbeat_timeouts_total";
/// Posts accepted by `POST /posts` (counter).
pub const POSTS_CREATED_TOTAL: &str = "pulse_posts_created_total";
