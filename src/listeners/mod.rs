//! Socket listeners and the pinger.
//!
//! This module turns bytes on Unix sockets into work for the daemon.
//!
//! ## Contents
//! - [`Listener`] one accept/receive state machine per socket path, generic over an [`ItemHandler`]
//! - [`Framer`] newline framing that survives arbitrary chunk boundaries
//! - [`DataHandler`], [`IncomingRequests`], [`OutgoingRequests`] the three handler kinds
//! - [`Pinger`] wakes listeners blocked in accept so they notice kill orders
//! - [`WorkerFactory`] builds every worker kind from the configuration
//!
//! ## Wiring
//! ```text
//! client ──"1234\n"──► in listener ──IncomingRequests──► submit(data worker 1234)
//! client ──"a:f:1\n"─► 1234 listener ──DataHandler────► Recorder::record
//! client ──"1234\n"──► out listener ──OutgoingRequests─► notify_completion(1234)
//! ```

mod factory;
mod framing;
mod handlers;
mod listener;
mod pinger;

pub use factory::WorkerFactory;
pub use framing::{Framer, Frames};
pub use handlers::{DataHandler, IncomingRequests, OutgoingRequests};
pub use listener::{ItemHandler, Listener, ListenerPhase, PhaseProbe, remove_socket_file};
pub use pinger::{Pinger, ping};
