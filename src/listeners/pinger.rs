//! # Pinger: wakes listeners blocked in accept.
//!
//! A killed listener only notices its kill flag between two steps, and a listener
//! waiting for a connection is stuck inside `accept`. The pinger sweeps over the
//! registered client workers and connects to each socket, writing a bare
//! separator, so that blocked listeners complete a step.
//!
//! ```text
//! pending empty? ─► refetch snapshot, sleep(interval)
//! else           ─► pop one worker; ping it unless it is Receiving
//! ```
//!
//! Listeners already reading from a connection are skipped: their reads time out
//! on their own, and piling connections onto their backlog would only delay them.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::core::{ControllerHandle, LiveWorker, Step, Work};
use crate::error::WorkerError;
use crate::listeners::framing::SEPARATOR;
use crate::listeners::listener::ListenerPhase;

/// Connects to `path` and sends one bare separator.
///
/// Returns `false` if nobody is listening; failures are otherwise ignored.
pub fn ping(path: &Path) -> bool {
    match UnixStream::connect(path) {
        Ok(mut stream) => stream.write_all(&[SEPARATOR]).is_ok(),
        Err(_) => false,
    }
}

/// Periodic liveness pinger.
pub struct Pinger {
    controller: ControllerHandle,
    prefix: PathBuf,
    interval: Duration,
    pending: Vec<LiveWorker>,
}

impl Pinger {
    pub fn new(controller: ControllerHandle, prefix: PathBuf, interval: Duration) -> Self {
        Self {
            controller,
            prefix,
            interval,
            pending: Vec::new(),
        }
    }

    fn wants_ping(worker: &LiveWorker) -> bool {
        worker.id.is_client() && worker.phase() != Some(ListenerPhase::Receiving)
    }
}

impl Work for Pinger {
    fn do_work(&mut self) -> Result<Step, WorkerError> {
        match self.pending.pop() {
            Some(worker) => {
                if Self::wants_ping(&worker) {
                    if let Some(path) = worker.id.socket_path(&self.prefix) {
                        let reached = ping(&path);
                        trace!(worker = %worker.id, reached, "pinged");
                    }
                }
            }
            None => {
                self.pending = self.controller.snapshot();
                self.pending.reverse();
                thread::sleep(self.interval);
            }
        }
        Ok(Step::Continue)
    }
}
