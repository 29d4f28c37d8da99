//! # pulse-core
//!
//! Foundation types shared by the Pulse crates:
//!
//! - **IDs**: [`ClientId`] and [`PostId`] newtypes backed by UUID v7
//! - **Messages**: the `{type, payload}` envelope pushed to WebSocket clients
//! - **Logging**: one-shot `tracing` subscriber installation

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod messages;

pub use ids::{ClientId, PostId};
pub use messages::WireMessage;
