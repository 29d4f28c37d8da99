//! The registered set of clients and the loop that owns its membership.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use pulse_core::ClientId;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{Client, Enqueued, Payload};
use crate::errors::HubError;
use crate::metrics::{
    BROADCAST_DROPS_TOTAL, BROADCASTS_TOTAL, CLIENTS_REGISTERED, SLOW_CLIENT_EVICTIONS_TOTAL,
};

/// Requests applied by the coordination loop, in arrival order.
enum HubCommand {
    Register(Arc<Client>),
    Unregister {
        client: Arc<Client>,
        ack: Option<oneshot::Sender<()>>,
    },
}

/// Per-call delivery summary returned by [`Hub::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Clients in the snapshot after applying the exclusion.
    pub recipients: usize,
    /// Payloads placed on an outbound queue.
    pub delivered: usize,
    /// Payloads dropped because a queue was full or the client was closing.
    pub dropped: usize,
}

/// Registry of live clients with fan-out broadcast.
///
/// Membership changes only inside [`run`](Self::run). [`register`](Self::register)
/// and [`unregister`](Self::unregister) enqueue requests for that loop;
/// [`broadcast`](Self::broadcast) copies a snapshot under a short read lock
/// and never waits on a client.
pub struct Hub {
    clients: RwLock<HashMap<ClientId, Arc<Client>>>,
    commands: mpsc::UnboundedSender<HubCommand>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<HubCommand>>>,
    slow_client_drop_limit: u64,
}

impl Hub {
    /// Create a hub that never evicts slow clients.
    pub fn new() -> Self {
        Self::with_drop_limit(0)
    }

    /// Create a hub that evicts a client once it has dropped `limit`
    /// messages (`0` disables eviction).
    pub fn with_drop_limit(limit: u64) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        Self {
            clients: RwLock::new(HashMap::new()),
            commands,
            inbox: Mutex::new(Some(inbox)),
            slow_client_drop_limit: limit,
        }
    }

    /// Ask the coordination loop to admit `client`.
    ///
    /// Fails only once the hub has shut down; the caller then owns the
    /// client again and should close its stream.
    pub fn register(&self, client: Arc<Client>) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Register(client))
            .map_err(|_| HubError::Closed)
    }

    /// Ask the coordination loop to remove `client` and close it.
    ///
    /// Idempotent. After shutdown the client is closed directly.
    pub fn unregister(&self, client: &Arc<Client>) {
        let command = HubCommand::Unregister {
            client: Arc::clone(client),
            ack: None,
        };
        if self.commands.send(command).is_err() {
            let _ = client.close();
        }
    }

    /// Like [`unregister`](Self::unregister), but resolves once the loop has
    /// applied the removal (or has shut down).
    ///
    /// The removal is applied by [`run`](Self::run). Called on a hub whose
    /// loop has not started yet, this waits until it starts.
    pub async fn unregister_and_wait(&self, client: &Arc<Client>) {
        let (ack, done) = oneshot::channel();
        let command = HubCommand::Unregister {
            client: Arc::clone(client),
            ack: Some(ack),
        };
        if self.commands.send(command).is_err() {
            let _ = client.close();
            return;
        }
        let _ = done.await;
    }

    /// Serialize `message` once and queue it for every registered client
    /// except `exclude`.
    pub fn broadcast<T>(
        &self,
        message: &T,
        exclude: Option<&ClientId>,
    ) -> Result<BroadcastOutcome, HubError>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(message)?;
        Ok(self.broadcast_payload(Payload::from(json), exclude))
    }

    /// Queue an already-serialized payload for every registered client
    /// except `exclude`.
    pub fn broadcast_payload(
        &self,
        payload: Payload,
        exclude: Option<&ClientId>,
    ) -> BroadcastOutcome {
        let snapshot: Vec<Arc<Client>> = {
            let clients = self.clients.read();
            clients
                .values()
                .filter(|c| Some(c.id()) != exclude)
                .cloned()
                .collect()
        };

        let mut outcome = BroadcastOutcome {
            recipients: snapshot.len(),
            ..BroadcastOutcome::default()
        };
        for client in &snapshot {
            match client.enqueue(Arc::clone(&payload)) {
                Enqueued::Queued => outcome.delivered += 1,
                Enqueued::Dropped { total } => {
                    outcome.dropped += 1;
                    counter!(BROADCAST_DROPS_TOTAL).increment(1);
                    debug!(client_id = %client.id(), total_drops = total, "outbound queue full, message dropped");
                    if self.slow_client_drop_limit > 0 && total == self.slow_client_drop_limit {
                        warn!(client_id = %client.id(), drops = total, "evicting slow client");
                        counter!(SLOW_CLIENT_EVICTIONS_TOTAL).increment(1);
                        self.unregister(client);
                    }
                }
                Enqueued::Closed => {
                    outcome.dropped += 1;
                    debug!(client_id = %client.id(), "client closing, message dropped");
                }
            }
        }

        counter!(BROADCASTS_TOTAL).increment(1);
        debug!(
            recipients = outcome.recipients,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "broadcast"
        );
        outcome
    }

    /// Run the coordination loop until `cancel` fires.
    ///
    /// On shutdown every registered client is removed and closed, queued
    /// requests are rejected, and later requests fail with
    /// [`HubError::Closed`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), HubError> {
        let mut inbox = self.inbox.lock().take().ok_or(HubError::AlreadyRunning)?;
        info!("hub coordination loop started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                command = inbox.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
            }
        }

        inbox.close();
        while let Ok(command) = inbox.try_recv() {
            match command {
                HubCommand::Register(client) => {
                    debug!(client_id = %client.id(), "registration rejected during shutdown");
                    let _ = client.close();
                }
                HubCommand::Unregister { client, ack } => {
                    let _ = client.close();
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
            }
        }

        let evicted: Vec<Arc<Client>> = {
            let mut clients = self.clients.write();
            clients.drain().map(|(_, c)| c).collect()
        };
        gauge!(CLIENTS_REGISTERED).set(0.0);
        for client in &evicted {
            let _ = client.close();
        }
        info!(closed = evicted.len(), "hub coordination loop stopped");
        Ok(())
    }

    fn apply(&self, command: HubCommand) {
        match command {
            HubCommand::Register(client) => self.admit(&client),
            HubCommand::Unregister { client, ack } => {
                self.evict(&client);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }

    fn admit(&self, client: &Arc<Client>) {
        let count = {
            let mut clients = self.clients.write();
            match clients
                .get(client.id())
                .map(|existing| Arc::ptr_eq(existing, client))
            {
                Some(true) => {
                    debug!(client_id = %client.id(), "client already registered");
                    return;
                }
                Some(false) => {
                    drop(clients);
                    warn!(client_id = %client.id(), "duplicate client id, rejecting registration");
                    let _ = client.close();
                    return;
                }
                None => {}
            }
            if !client.admit() {
                debug!(client_id = %client.id(), state = ?client.state(), "client closed before admission");
                return;
            }
            let _ = clients.insert(client.id().clone(), Arc::clone(client));
            clients.len()
        };
        gauge!(CLIENTS_REGISTERED).set(count as f64);
        info!(client_id = %client.id(), clients = count, "client registered");
    }

    fn evict(&self, client: &Arc<Client>) {
        let removed = {
            let mut clients = self.clients.write();
            let found = clients
                .get(client.id())
                .is_some_and(|registered| Arc::ptr_eq(registered, client));
            if found {
                let _ = clients.remove(client.id());
                Some(clients.len())
            } else {
                None
            }
        };
        let _ = client.close();
        match removed {
            Some(count) => {
                gauge!(CLIENTS_REGISTERED).set(count as f64);
                info!(client_id = %client.id(), clients = count, "client unregistered");
            }
            None => debug!(client_id = %client.id(), "unregister for absent client ignored"),
        }
    }

    /// Number of registered clients.
    pub fn connection_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether a client with `id` is registered.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.read().contains_key(id)
    }

    /// IDs of all registered clients, in no particular order.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.read().keys().cloned().collect()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
