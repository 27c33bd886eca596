//! # LogWriter: events to `tracing`
//!
//! A subscriber that turns every [`Event`] into one structured log line.
//!
//! ## Example output
//! ```text
//! INFO  worker added worker=in seq=0
//! WARN  fault absorbed worker=1234 err="store unavailable: timeout"
//! ERROR worker failed worker=1234 err="store unavailable: timeout"
//! INFO  worker stopped worker=1234 reason=done
//! ERROR fatal failure, shutting down worker=1234
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.map(|w| w.to_string()).unwrap_or_default();
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::WorkerAdded => info!(worker = %worker, seq = e.seq, "worker added"),
            EventKind::WorkerRejected => warn!(worker = %worker, reason, "worker rejected"),
            EventKind::FaultAbsorbed => warn!(worker = %worker, err = reason, "fault absorbed"),
            EventKind::WorkerFailed => error!(worker = %worker, err = reason, "worker failed"),
            // Client workers come and go constantly; keep them out of info.
            EventKind::WorkerStopped if e.worker.is_some_and(|w| w.is_client()) => {
                debug!(worker = %worker, reason, "worker stopped")
            }
            EventKind::WorkerStopped => info!(worker = %worker, reason, "worker stopped"),
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::FatalFailure => {
                error!(worker = %worker, err = reason, "fatal failure, shutting down")
            }
            EventKind::AllStoppedWithin => info!("all workers stopped within grace"),
            EventKind::GraceExceeded => error!(stuck = reason, "grace exceeded"),
            EventKind::SubscriberOverflow => warn!(reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => error!(reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
