//! # Recorders: where data workers deliver coverage events.
//!
//! Every data worker shares one [`Recorder`] (behind an `Arc`). A call to
//! [`Recorder::record`] either succeeds or fails with a [`StoreError`], which the
//! calling worker treats as a transient fault.
//!
//! - [`LogRecorder`] writes each event to the log; useful for debugging a setup.
//! - [`MemoryRecorder`] keeps a capped, deduplicated in-process store and answers
//!   "was this function called?" queries.

mod log;
mod memory;

pub use log::LogRecorder;
pub use memory::{CoverageRecord, MemoryRecorder};

use crate::error::StoreError;

/// Sink for raw `path:function:line` coverage events.
pub trait Recorder: Send + Sync + 'static {
    /// Persists one raw event.
    fn record(&self, raw: &str) -> Result<(), StoreError>;
}
