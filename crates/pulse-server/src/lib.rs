//! # pulse-server
//!
//! Connection hub plus the Axum HTTP + `WebSocket` surface around it.
//!
//! - Hub: registered set of live clients, coordination loop, fan-out broadcast
//! - Per-client drain loop: the single writer for each socket
//! - `WebSocket` acceptance: upgrade, heartbeat, read loop, cleanup
//! - HTTP endpoints: welcome, health, metrics, post creation
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{HubError, StreamError};
pub use hub::{BroadcastOutcome, Client, Hub};
pub use server::PulseServer;
