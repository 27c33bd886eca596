//! # Listener: Unix-socket accept/receive state machine.
//!
//! A [`Listener`] owns one socket path and turns the bytes its clients send into
//! discrete messages for an [`ItemHandler`]. Each call to `do_work` performs one
//! transition:
//!
//! ```text
//!            bind (delete stale file, bind, chmod 777, listen)
//! NotStarted ──────────────────────────────────────────────► Listening
//!                                                               │ accept (blocking)
//!                                                               ▼
//!             peer closed (empty read)                      Receiving ◄─┐
//! Listening ◄───────────────────────────────────────────────────┤       │ data: frame + dispatch
//!                                                               └───────┘ timeout: no-op
//!
//! after every step: idle for longer than idle_span? ─► Done
//! clean_up:         delete the socket file
//! ```
//!
//! ## Rules
//! - Messages of one connection are dispatched in arrival order.
//! - Only dispatched messages count as significant activity; pings do not.
//! - A failing message does not stop the rest of its chunk from being dispatched;
//!   the first error is reported as the step's fault.
//! - A partial message left when the peer closes is discarded.

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::core::{Step, Work};
use crate::error::WorkerError;
use crate::listeners::framing::Framer;

/// Bytes read from a connection per step.
pub const RCV_CHUNK_SIZE: usize = 1024;

/// Turns one framed message into an effect.
pub trait ItemHandler: Send + 'static {
    /// Handles one complete, non-empty message.
    fn process_item(&mut self, item: &str) -> Result<(), WorkerError>;
}

/// Phase of a listener's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerPhase {
    /// Socket not bound yet.
    NotStarted = 0,
    /// Waiting in accept.
    Listening = 1,
    /// Reading from an accepted connection.
    Receiving = 2,
}

impl ListenerPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ListenerPhase::Listening,
            2 => ListenerPhase::Receiving,
            _ => ListenerPhase::NotStarted,
        }
    }
}

/// Shared, read-only view of a listener's current phase.
#[derive(Debug, Clone)]
pub struct PhaseProbe(Arc<AtomicU8>);

impl PhaseProbe {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ListenerPhase::NotStarted as u8)))
    }

    /// Current phase.
    pub fn phase(&self) -> ListenerPhase {
        ListenerPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, phase: ListenerPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

/// A socket listener driving an [`ItemHandler`].
pub struct Listener<H> {
    path: PathBuf,
    idle_span: Option<Duration>,
    recv_timeout: Option<Duration>,
    probe: PhaseProbe,
    socket: Option<UnixListener>,
    conn: Option<UnixStream>,
    framer: Framer,
    last_activity: Instant,
    handler: H,
}

impl<H: ItemHandler> Listener<H> {
    /// Creates a listener for `path`; it never times out and reads block indefinitely.
    pub fn new(path: impl Into<PathBuf>, handler: H) -> Self {
        Self {
            path: path.into(),
            idle_span: None,
            recv_timeout: None,
            probe: PhaseProbe::new(),
            socket: None,
            conn: None,
            framer: Framer::default(),
            last_activity: Instant::now(),
            handler,
        }
    }

    /// Self-terminates after `span` without a dispatched message (`0` disables).
    pub fn with_idle_span(mut self, span: Duration) -> Self {
        self.idle_span = Some(span).filter(|d| !d.is_zero());
        self
    }

    /// Bounds every read so kill and idle checks run while a client is silent.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout).filter(|d| !d.is_zero());
        self
    }

    /// Current phase.
    pub fn phase(&self) -> ListenerPhase {
        self.probe.phase()
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn bind(&mut self) -> Result<(), WorkerError> {
        remove_socket_file(&self.path)?;
        let socket =
            UnixListener::bind(&self.path).map_err(|e| WorkerError::socket(&self.path, e))?;
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o777))
            .map_err(|e| WorkerError::socket(&self.path, e))?;

        debug!(path = %self.path.display(), "listening");
        self.socket = Some(socket);
        self.last_activity = Instant::now();
        self.probe.set(ListenerPhase::Listening);
        Ok(())
    }

    fn accept(&mut self) -> Result<(), WorkerError> {
        let Some(socket) = self.socket.as_ref() else {
            self.probe.set(ListenerPhase::NotStarted);
            return Ok(());
        };
        let (stream, _) = socket.accept()?;
        stream.set_read_timeout(self.recv_timeout)?;
        trace!(path = %self.path.display(), "connection accepted");
        self.conn = Some(stream);
        self.probe.set(ListenerPhase::Receiving);
        Ok(())
    }

    fn receive(&mut self) -> Result<(), WorkerError> {
        let Some(conn) = self.conn.as_mut() else {
            self.probe.set(ListenerPhase::Listening);
            return Ok(());
        };

        let mut buf = [0u8; RCV_CHUNK_SIZE];
        match conn.read(&mut buf) {
            Ok(0) => {
                self.hang_up();
                Ok(())
            }
            Ok(n) => self.dispatch(&buf[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(())
            }
            Err(e) => {
                self.hang_up();
                Err(e.into())
            }
        }
    }

    fn hang_up(&mut self) {
        self.conn = None;
        let discarded = self.framer.reset();
        if discarded > 0 {
            debug!(path = %self.path.display(), bytes = discarded, "peer closed mid-message");
        }
        self.probe.set(ListenerPhase::Listening);
    }

    fn dispatch(&mut self, chunk: &[u8]) -> Result<(), WorkerError> {
        let frames = self.framer.push(chunk);
        if !frames.items.is_empty() {
            self.last_activity = Instant::now();
        }

        let mut first_err = None;
        for raw in &frames.items {
            let res = match std::str::from_utf8(raw) {
                Ok(item) => self.handler.process_item(item),
                Err(e) => Err(WorkerError::Framing(format!("message is not utf-8: {e}"))),
            };
            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        }
        if frames.dropped > 0 {
            first_err.get_or_insert(WorkerError::Framing(format!(
                "dropped {} bytes without separator",
                frames.dropped
            )));
        }
        first_err.map_or(Ok(()), Err)
    }

    fn idle_check(&self) -> Step {
        match self.idle_span {
            Some(span) if self.last_activity.elapsed() > span => {
                debug!(path = %self.path.display(), idle = ?span, "idle for too long, leaving");
                Step::Done
            }
            _ => Step::Continue,
        }
    }
}

impl<H: ItemHandler> Work for Listener<H> {
    fn do_work(&mut self) -> Result<Step, WorkerError> {
        match self.probe.phase() {
            ListenerPhase::NotStarted => self.bind()?,
            ListenerPhase::Listening => self.accept()?,
            ListenerPhase::Receiving => self.receive()?,
        }
        Ok(self.idle_check())
    }

    fn clean_up(&mut self, _killed: bool) -> Result<(), WorkerError> {
        self.conn = None;
        self.socket = None;
        remove_socket_file(&self.path)
    }

    fn socket_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    fn phase_probe(&self) -> Option<PhaseProbe> {
        Some(self.probe.clone())
    }
}

/// Deletes a socket file; a missing file is not an error.
pub fn remove_socket_file(path: &Path) -> Result<(), WorkerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkerError::socket(path, e)),
    }
}
