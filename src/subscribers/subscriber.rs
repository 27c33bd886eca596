//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging custom event handlers
//! (logging, metrics, alerting) into the daemon.
//!
//! Each subscriber gets:
//! - **Dedicated task** on the owner runtime
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are published as `EventKind::SubscriberPanicked`)
//! - **Kind filter** ([`Subscribe::interested`]), applied before queueing
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use coverd::{Event, EventKind, Subscribe};
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::WorkerFailed) {
//!             // bump a counter, page someone, ...
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failure-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Event subscriber for runtime observability.
///
/// ### Implementation requirements
/// - Avoid blocking the owner runtime: it also drives the supervision cycle.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (clamped to 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }

    /// Returns whether events of `kind` are queued for this subscriber.
    ///
    /// Default: every kind.
    fn interested(&self, _kind: EventKind) -> bool {
        true
    }
}
