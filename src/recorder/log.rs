use tracing::debug;

use super::Recorder;
use crate::error::StoreError;

/// Recorder that only logs what it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

impl Recorder for LogRecorder {
    fn record(&self, raw: &str) -> Result<(), StoreError> {
        debug!(event = raw, "recorded");
        Ok(())
    }
}
