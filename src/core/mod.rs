//! Runtime core: workers, the controller and the owner's supervision cycle.
//!
//! Internal modules:
//! - [`id`]: worker identities and the socket paths derived from them;
//! - [`worker`]: one supervised unit of work on its own OS thread;
//! - [`controller`]: registry of live workers and its handoff queues;
//! - [`app`]: supervision cycle and shutdown sequence;
//! - [`shutdown`]: OS termination signals.

mod app;
mod controller;
mod id;
mod shutdown;
mod worker;

pub use app::App;
pub use controller::{Controller, ControllerHandle, LiveWorker, WorkerStatus};
pub use id::{ControlRole, WorkerId};
pub use worker::{Step, Work, Worker, WorkerExit};
