//! # Fan-out of daemon events to the registered subscribers.
//!
//! The set owns one lane per subscriber: a bounded queue and the task draining it.
//! [`SubscriberSet::forward`] ties the set to the [`Bus`] for the lifetime of the
//! daemon.
//!
//! ```text
//! Bus ──► forward() ──► emit(event)
//!                          ├── interested? ──► [lane 1] ──► subscriber1.on_event()
//!                          │                      └──────► panic → SubscriberPanicked
//!                          └── interested? ──► [lane N] ──► subscriberN.on_event()
//!
//! stop cancelled ──► deliver what the bus still holds ──► close lanes ──► await tasks
//! ```
//!
//! ## Rules
//! - `emit()` never waits: a full lane drops the event for that subscriber only and
//!   publishes `SubscriberOverflow`.
//! - Each lane is FIFO; lanes are independent of each other.
//! - A subscriber only receives the kinds it declares interest in.
//!
//! The set spawns tasks, so it must be built inside a tokio runtime.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// One subscriber's queue and the task draining it.
struct Lane {
    sub: Arc<dyn Subscribe>,
    tx: mpsc::Sender<Arc<Event>>,
    task: JoinHandle<()>,
}

impl Lane {
    fn spawn(sub: Arc<dyn Subscribe>, bus: Bus) -> Self {
        let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
        let task = tokio::spawn(deliver(Arc::clone(&sub), rx, bus));
        Self { sub, tx, task }
    }
}

/// Feeds one subscriber until its lane closes; panics become events.
async fn deliver(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        if let Err(payload) = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await {
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*payload)));
        }
    }
}

/// Subscribers of the daemon's events.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one lane per subscriber.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let lanes = subs
            .into_iter()
            .map(|sub| Lane::spawn(sub, bus.clone()))
            .collect();
        Self { lanes, bus }
    }

    /// Queues `event` on the lane of every interested subscriber.
    pub fn emit(&self, event: Event) {
        let kind = event.kind;
        let event = Arc::new(event);
        for lane in self.lanes.iter().filter(|l| l.sub.interested(kind)) {
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            // An overflow of an overflow event would loop through the bus.
            if kind != EventKind::SubscriberOverflow {
                self.bus
                    .publish(Event::subscriber_overflow(lane.sub.name(), reason));
            }
        }
    }

    /// Forwards every bus event to the set until `stop` is cancelled.
    ///
    /// Events published before `stop` and still buffered on the bus are delivered,
    /// then the set is shut down. The receiver is registered before this returns,
    /// so nothing published afterwards is missed.
    pub fn forward(self, stop: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => self.emit(ev),
                        Err(RecvError::Lagged(n)) => warn!(skipped = n, "event forwarder lagged"),
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => self.emit(ev),
                                Err(TryRecvError::Lagged(n)) => {
                                    warn!(skipped = n, "event forwarder lagged while draining");
                                }
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                }
            }
            self.shutdown().await;
        })
    }

    /// Closes every lane and waits for the subscribers to finish their backlog.
    pub async fn shutdown(self) {
        for lane in self.lanes {
            let name = lane.sub.name();
            drop(lane.tx);
            if let Err(e) = lane.task.await {
                debug!(subscriber = name, err = %e, "subscriber task ended abnormally");
            }
        }
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
