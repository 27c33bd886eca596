//! Builds every kind of worker the daemon runs from one [`Config`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::core::{ControlRole, ControllerHandle, Worker, WorkerId};
use crate::listeners::handlers::{DataHandler, IncomingRequests, OutgoingRequests};
use crate::listeners::listener::{ItemHandler, Listener};
use crate::listeners::pinger::Pinger;
use crate::policies::FaultPolicy;
use crate::recorder::Recorder;

/// Cloneable worker builder, shared with the incoming listeners.
#[derive(Clone)]
pub struct WorkerFactory {
    prefix: PathBuf,
    data_idle_span: Option<Duration>,
    recv_timeout: Option<Duration>,
    ping_interval: Duration,
    policy: FaultPolicy,
    recorder: Arc<dyn Recorder>,
}

impl WorkerFactory {
    pub fn new(config: &Config, recorder: Arc<dyn Recorder>) -> Self {
        Self {
            prefix: config.socket_prefix.clone(),
            data_idle_span: config.data_idle_span(),
            recv_timeout: config.recv_timeout(),
            ping_interval: config.ping_interval(),
            policy: config.fault_policy(),
            recorder,
        }
    }

    /// Data worker for client `pid`, listening on `{prefix}_{pid}`.
    pub fn data_worker(&self, pid: u32) -> Worker {
        let id = WorkerId::Client(pid);
        let mut listener = self.listener(id, DataHandler::new(self.recorder.clone()));
        if let Some(span) = self.data_idle_span {
            listener = listener.with_idle_span(span);
        }
        Worker::new(id, listener, self.policy)
    }

    /// Listener accepting client arrivals on `in` or `in_cli`.
    pub fn incoming(&self, role: ControlRole, controller: ControllerHandle) -> Worker {
        let id = WorkerId::Control(role);
        let handler = IncomingRequests::new(controller, self.clone());
        Worker::new(id, self.listener(id, handler), self.policy)
    }

    /// Listener accepting client departures on `out`.
    pub fn outgoing(&self, controller: ControllerHandle) -> Worker {
        let id = WorkerId::Control(ControlRole::Outgoing);
        let handler = OutgoingRequests::new(controller);
        Worker::new(id, self.listener(id, handler), self.policy)
    }

    /// The pinger.
    pub fn pinger(&self, controller: ControllerHandle) -> Worker {
        let pinger = Pinger::new(controller, self.prefix.clone(), self.ping_interval);
        Worker::new(WorkerId::Control(ControlRole::Pinger), pinger, self.policy)
    }

    /// Control workers started with the daemon: `in`, optionally `in_cli`, `out`, pinger.
    pub fn control_workers(&self, controller: &ControllerHandle, enable_cli: bool) -> Vec<Worker> {
        let mut workers = vec![self.incoming(ControlRole::Incoming, controller.clone())];
        if enable_cli {
            workers.push(self.incoming(ControlRole::IncomingCli, controller.clone()));
        }
        workers.push(self.outgoing(controller.clone()));
        workers.push(self.pinger(controller.clone()));
        workers
    }

    fn listener<H: ItemHandler>(&self, id: WorkerId, handler: H) -> Listener<H> {
        let listener = Listener::new(id.suffixed(&self.prefix), handler);
        match self.recv_timeout {
            Some(timeout) => listener.with_recv_timeout(timeout),
            None => listener,
        }
    }
}
