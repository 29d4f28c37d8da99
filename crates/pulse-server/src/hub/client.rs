//! One connected peer: identity, lifecycle state, and outbound queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pulse_core::ClientId;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A serialized message shared by every recipient of one broadcast.
pub type Payload = Arc<str>;

/// Lifecycle of a [`Client`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    /// Handed to the hub, not yet admitted.
    Pending = 0,
    /// Admitted into the registered set.
    Registered = 1,
    /// Stream failed, evicted, or shutting down; drain loop is exiting.
    Closing = 2,
    /// Stream released and drain loop finished.
    Closed = 3,
}

impl ClientState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Pending,
            1 => Self::Registered,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Result of [`Client::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The payload is in the outbound queue.
    Queued,
    /// The queue was full; `total` is this client's lifetime drop count.
    Dropped {
        /// Lifetime drops including this one.
        total: u64,
    },
    /// The client is closing or closed.
    Closed,
}

/// A connected peer as seen by the hub.
///
/// The client owns the sending half of its outbound queue. The receiving half
/// goes to the drain loop, the only task that writes to the stream.
pub struct Client {
    id: ClientId,
    state: AtomicU8,
    tx: mpsc::Sender<Payload>,
    cancel: CancellationToken,
    connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl Client {
    /// Create a pending client with a fresh ID around an existing queue sender.
    pub fn new(tx: mpsc::Sender<Payload>) -> Self {
        Self::with_id(ClientId::new(), tx)
    }

    /// Create a pending client with a caller-chosen ID.
    pub fn with_id(id: ClientId, tx: mpsc::Sender<Payload>) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: AtomicU8::new(ClientState::Pending as u8),
            tx,
            cancel: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a pending client together with the receiving half of its queue.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(tx)), rx)
    }

    /// This client's identifier.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the client has started closing (or finished).
    pub fn is_closing(&self) -> bool {
        matches!(self.state(), ClientState::Closing | ClientState::Closed)
    }

    /// Try to queue `payload` without waiting.
    pub fn enqueue(&self, payload: Payload) -> Enqueued {
        if self.is_closing() {
            return Enqueued::Closed;
        }
        match self.tx.try_send(payload) {
            Ok(()) => Enqueued::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped_messages.fetch_add(1, Ordering::Relaxed) + 1;
                Enqueued::Dropped { total }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueued::Closed,
        }
    }

    /// Begin closing: stop accepting payloads and cancel the drain loop.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn close(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= ClientState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                ClientState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.cancel.cancel();
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// `pending → registered`. Fails if the client already started closing.
    pub(crate) fn admit(&self) -> bool {
        self.state
            .compare_exchange(
                ClientState::Pending as u8,
                ClientState::Registered as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `closing → closed`, called by the drain loop on its way out.
    pub(crate) fn mark_closed(&self) {
        let _ = self.close();
        self.state.store(ClientState::Closed as u8, Ordering::Release);
    }

    /// Lifetime count of payloads dropped on a full queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity from the peer.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Read and reset the liveness flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the peer was last heard from.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Time since the client was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
