//! Client registry and fan-out.
//!
//! Every connected WebSocket session owns a bounded outbound queue; the
//! [`Broadcaster`] keeps the sending half of each.  Delivery never waits: a
//! frame is pushed with `try_send`, and a client whose queue is full or whose
//! session has already gone away is evicted on the spot.  A slow browser
//! therefore cannot hold up the controller link or the other clients.
//!
//! The broadcaster is owned by the hub task and is never shared, so it needs
//! no locking and every client sees frames in the order the hub produced
//! them.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::domain::messages::{ClientFrame, ClientId};

/// Result of handing one frame to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the client's writer task.
    Sent,
    /// The client was not registered.
    Unknown,
    /// The client was evicted because its queue was full or closed.
    Evicted,
}

/// Outcome of a [`Broadcaster::broadcast`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients the frame was queued for.
    pub delivered: usize,
    /// Clients removed during this broadcast.
    pub evicted: Vec<ClientId>,
}

/// The set of connected clients.
#[derive(Debug, Default)]
pub struct Broadcaster {
    clients: HashMap<ClientId, mpsc::Sender<ClientFrame>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Adds a client.  Returns `true` if the set was empty before.
    ///
    /// Registering an id twice replaces the previous queue.
    pub fn register(&mut self, id: ClientId, outbox: mpsc::Sender<ClientFrame>) -> bool {
        let was_empty = self.clients.is_empty();
        if self.clients.insert(id, outbox).is_some() {
            warn!(client = %id, "client registered twice; replacing its queue");
        }
        debug!(client = %id, clients = self.clients.len(), "client registered");
        was_empty
    }

    /// Removes a client.  Returns `true` only if the client was present and
    /// the set is now empty.
    ///
    /// Unregistering an unknown id is a no-op, so a session that was already
    /// evicted can report its own disconnect without side effects.
    pub fn unregister(&mut self, id: ClientId) -> bool {
        if self.clients.remove(&id).is_none() {
            return false;
        }
        debug!(client = %id, clients = self.clients.len(), "client unregistered");
        self.clients.is_empty()
    }

    /// Queues `frame` for a single client.
    pub fn send_to(&mut self, id: ClientId, frame: ClientFrame) -> Delivery {
        let Some(outbox) = self.clients.get(&id) else {
            return Delivery::Unknown;
        };
        match outbox.try_send(frame) {
            Ok(()) => Delivery::Sent,
            Err(err) => {
                self.evict(id, &err);
                Delivery::Evicted
            }
        }
    }

    /// Queues `frame` for every client, evicting the ones that cannot take
    /// it.
    pub fn broadcast(&mut self, frame: &ClientFrame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut failures = Vec::new();

        for (&id, outbox) in &self.clients {
            match outbox.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => failures.push((id, err)),
            }
        }

        for (id, err) in failures {
            self.evict(id, &err);
            report.evicted.push(id);
        }
        report
    }

    fn evict(&mut self, id: ClientId, reason: &TrySendError<ClientFrame>) {
        self.clients.remove(&id);
        match reason {
            TrySendError::Full(_) => {
                warn!(client = %id, "client queue full; disconnecting slow client")
            }
            TrySendError::Closed(_) => debug!(client = %id, "client queue closed; dropping client"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
