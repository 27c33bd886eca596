//! # coverd
//!
//! **coverd** is a supervised local telemetry-ingestion daemon.
//!
//! Instrumented processes on the same host announce themselves on a control
//! socket, stream `path:function:line` coverage events over a private Unix socket
//! each, and announce their departure on a second control socket. The daemon
//! forwards every event to a [`Recorder`] and keeps itself healthy by supervising
//! one OS thread per socket.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   client 1234                                   client 5678
//!   ├─ "1234\n" ─► {prefix}_in                    ├─ ...
//!   ├─ "a.php:f:3\n" ─► {prefix}_1234             │
//!   └─ "1234\n" ─► {prefix}_out                   │
//!                    │                            │
//!                    ▼                            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Worker threads (one per socket, plus the pinger)                 │
//! │  Listener state machine ─► ItemHandler ─► Recorder / Controller   │
//! │  FaultBuffer per worker; kill flag checked between steps          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        │ submit(worker)   │ notify_completion│ notify_failure
//!        ▼                  ▼                  ▼
//!  [creation queue]   [completion queue]  [failure queue]
//!        │                  │                  │
//! ┌──────▼──────────────────▼──────────────────▼──────────────────────┐
//! │  App (owner thread): supervision cycle every cycle_floor          │
//! │    check_failures ─► reap_completed ─► integrate_new              │
//! │  Controller registry (single writer) ─► live-id snapshot (watch)  │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//!                 Bus (broadcast) ─► SubscriberSet ─► LogWriter, ...
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! submit ─► (queued) ─► integrate_new ─► Running ─► kill / completion ─► Stopping
//!                                                        │
//!                               thread exited, reaped ◄──┘ ─► Stopped (removed)
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                          |
//! |-------------------|----------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Owner-side registry, handoff queues, fatal cascade, shutdown.  | [`App`], [`Controller`], [`ControllerHandle`] |
//! | **Workers**       | One OS thread per unit of work, cooperative kill.              | [`Worker`], [`Work`], [`Step`]              |
//! | **Listeners**     | Unix-socket accept/receive state machine with framing.         | [`Listener`], [`ItemHandler`], [`Framer`]   |
//! | **Policies**      | Sliding-window fault tolerance with backpressure.              | [`FaultPolicy`], [`FaultBuffer`]            |
//! | **Recorders**     | Where coverage events end up.                                  | [`Recorder`], [`MemoryRecorder`]            |
//! | **Subscriber API**| Hook into worker lifecycle events.                             | [`Subscribe`], [`LogWriter`]                |
//! | **Errors**        | Typed errors for workers, stores and the runtime.              | [`WorkerError`], [`RuntimeError`]           |
//! | **Configuration** | TOML configuration with defaults and validation.               | [`Config`]                                  |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use coverd::{App, Config, LogWriter, MemoryRecorder, Subscribe};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let recorder = Arc::new(MemoryRecorder::new(cfg.recorder.capacity));
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//!     App::new(cfg, recorder, subs).run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
mod core;
mod error;
mod events;
mod listeners;
mod policies;
mod recorder;
mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{
    App, ControlRole, Controller, ControllerHandle, LiveWorker, Step, Work, Worker, WorkerExit,
    WorkerId, WorkerStatus,
};
pub use error::{
    ConfigError, ControllerError, RuntimeError, StoreError, SubmitError, WorkerError,
};
pub use events::{Bus, Event, EventKind};
pub use listeners::{
    DataHandler, Framer, Frames, IncomingRequests, ItemHandler, Listener, ListenerPhase,
    OutgoingRequests, PhaseProbe, Pinger, WorkerFactory, ping,
};
pub use policies::{FaultBuffer, FaultPolicy, FaultRecord};
pub use recorder::{CoverageRecord, LogRecorder, MemoryRecorder, Recorder};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
