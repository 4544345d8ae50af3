//! # Event bus for host runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that the supervisor, client
//! contexts, endpoints and retry loops can publish without blocking.
//!
//! ```text
//! Publishers (many):                      Subscribers:
//!   ConnectionContextSupervisor ──┐
//!   ReceiveEndpoint (per entity) ─┼──► Bus ──► Host listener ──► SubscriberSet
//!   ClientContext dispatch ───────┤        └─► Host::subscribe_events() receivers
//!   RetryPolicy::execute ─────────┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks; events without receivers are dropped.
//! - One ring buffer of `capacity` events is shared by all receivers.
//! - Slow receivers observe `RecvError::Lagged(n)` and skip `n` events.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
