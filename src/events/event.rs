//! # Runtime events emitted by the app, the controller and the workers.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Worker lifecycle**: added, rejected, fault absorbed, failed, stopped
//! - **Shutdown**: requested, fatal failure, stopped within grace, grace exceeded
//! - **Subscriber health**: overflow, panic
//!
//! The [`Event`] struct carries the optional metadata (worker id, reason).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use coverd::{Event, EventKind, WorkerId};
//!
//! let ev = Event::new(EventKind::FaultAbsorbed)
//!     .with_worker(WorkerId::Client(42))
//!     .with_reason("store unavailable");
//!
//! assert_eq!(ev.kind, EventKind::FaultAbsorbed);
//! assert_eq!(ev.worker, Some(WorkerId::Client(42)));
//! assert_eq!(ev.reason.as_deref(), Some("store unavailable"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::core::WorkerId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: subscriber name and panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: subscriber name and reason
    SubscriberOverflow,

    // === Worker lifecycle ===
    /// Worker promoted into the registry and its thread started.
    ///
    /// Sets:
    /// - `worker`
    WorkerAdded,

    /// Submission dropped unstarted: its id is already registered, or the client
    /// already departed.
    ///
    /// Sets:
    /// - `worker`
    /// - `reason`: `duplicate_id` or `already_departed`
    WorkerRejected,

    /// Worker absorbed a transient fault and keeps running.
    ///
    /// Sets:
    /// - `worker`
    /// - `reason`: rendered error
    FaultAbsorbed,

    /// Worker exhausted its fault tolerance.
    ///
    /// Sets:
    /// - `worker`
    /// - `reason`: rendered error
    WorkerFailed,

    /// Worker thread left its work loop (after clean-up).
    ///
    /// Sets:
    /// - `worker`
    /// - `reason`: exit reason label
    WorkerStopped,

    // === Shutdown events ===
    /// Shutdown requested by the operator (OS signal observed).
    ShutdownRequested,

    /// Shutdown forced by a fatal condition.
    ///
    /// Sets:
    /// - `worker`: failing worker, when known
    /// - `reason`: rendered error
    FatalFailure,

    /// All worker threads exited within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some workers did not stop in time.
    ///
    /// Sets:
    /// - `reason`: stuck worker ids
    GraceExceeded,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Worker concerned, if applicable.
    pub worker: Option<WorkerId>,
    /// Human-readable reason (errors, exit reasons, overflow details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            reason: None,
        }
    }

    /// Attaches a worker id.
    #[inline]
    pub fn with_worker(mut self, id: WorkerId) -> Self {
        self.worker = Some(id);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }
}
