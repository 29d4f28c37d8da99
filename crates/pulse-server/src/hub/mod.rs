//! Connection hub: who is currently reachable, and fan-out to them.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `client` | Per-peer identity, lifecycle state, bounded outbound queue |
//! | `registry` | `Hub`: registered set, coordination loop, broadcast |
//! | `drain` | Per-client task that writes queued payloads to its stream |
//! | `sink` | `MessageSink` trait for the write half of a stream |
//!
//! ## Data Flow
//!
//! acceptor → `Hub::register` → coordination loop admits.
//! `Hub::broadcast` → each client's queue → `drain` → stream.
//! write failure / eviction / disconnect → `Hub::unregister` → loop removes.

pub mod client;
pub mod drain;
pub mod registry;
pub mod sink;

pub use client::{Client, ClientState, Enqueued, Payload};
pub use drain::{DrainExit, run_drain_loop};
pub use registry::{BroadcastOutcome, Hub};
pub use sink::MessageSink;
