//! WebSocket acceptance: turns an upgraded socket into a hub client.

pub mod heartbeat;
pub mod session;
pub mod sink;

pub use session::{SessionConfig, run_ws_session, watch_liveness};
