//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from many sources at once: worker threads,
//! the controller and the app all hold a clone.
//!
//! ```text
//! Publishers (many):                 Subscriber (one):
//!   Worker 1 ───┐
//!   Worker N ───┼──────► Bus ───────► SubscriberSet::forward
//!   Controller ─┤  (broadcast chan)
//!   App ────────┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks and needs no runtime, so
//!   plain OS threads can call it.
//! - **Bounded capacity**: slow receivers observe `RecvError::Lagged(n)`.
//! - **No persistence**: events are lost if there are no active receivers.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; drops it if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
