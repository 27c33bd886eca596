//! # Controller: registry of live workers and the handoff queues around it.
//!
//! Many threads talk to the controller at once (workers reporting completion or
//! failure, control listeners submitting new data workers), but only the **owner**
//! thread ever mutates the registry. The three unbounded queues are the single
//! serialization point between them.
//!
//! ```text
//!  any thread (ControllerHandle)           owner thread (Controller)
//!  ─────────────────────────────           ─────────────────────────
//!  submit(worker)        ──► [creation] ──► integrate_new()  → insert + spawn thread
//!  notify_completion(id) ──► [completion] ─► reap_completed() → kill, mark Stopping,
//!                                                               remove exited threads
//!  notify_failure(id,e)  ──► [failure] ───► check_failures()  → kill_all, fatal
//!
//!  current_ids()/snapshot() ◄── watch ◄──── published after every registry mutation
//! ```
//!
//! ## Rules
//! - Registry is keyed by [`WorkerId`]; two live workers never share one.
//! - A submission whose id is already registered is **rejected** (dropped unstarted).
//! - A completion for an id not registered yet is remembered for [`DEPARTURE_TTL`];
//!   a submission for that id arriving in the meantime is rejected as departed.
//! - A record leaves the registry only once its thread has exited.
//! - Kill is best-effort and idempotent; unknown ids are not an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::id::WorkerId;
use crate::core::worker::{Worker, WorkerExit};
use crate::error::{ControllerError, RuntimeError, SubmitError, WorkerError};
use crate::events::{Bus, Event, EventKind};
use crate::listeners::{ListenerPhase, PhaseProbe};
use crate::subscribers::panic_message;

/// How long a completion for a not-yet-registered id is remembered.
///
/// Covers a client whose departure reaches the owner before its arrival was
/// integrated.
pub const DEPARTURE_TTL: Duration = Duration::from_secs(5);

/// Lifecycle status of a registered worker.
///
/// A submitted worker has no status until it is integrated: it is a [`Worker`]
/// sitting in the creation queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Thread started and not asked to stop.
    Running,
    /// Killed or reaped; waiting for its thread to exit.
    Stopping,
    /// Thread exited; record is being removed.
    Stopped,
}

/// Read-only view of one registered worker, shared with other threads.
#[derive(Debug, Clone)]
pub struct LiveWorker {
    /// Worker identity.
    pub id: WorkerId,
    /// Status at the time of the snapshot.
    pub status: WorkerStatus,
    probe: Option<PhaseProbe>,
}

impl LiveWorker {
    /// Current listener phase, for workers that own a socket.
    pub fn phase(&self) -> Option<ListenerPhase> {
        self.probe.as_ref().map(PhaseProbe::phase)
    }
}

/// A registered worker, owned by the controller.
struct WorkerRecord {
    id: WorkerId,
    handle: JoinHandle<WorkerExit>,
    kill: CancellationToken,
    status: WorkerStatus,
    socket_path: Option<PathBuf>,
    probe: Option<PhaseProbe>,
    seq: u64,
}

/// Cloneable, thread-safe entry point to the controller.
#[derive(Clone)]
pub struct ControllerHandle {
    create_tx: mpsc::UnboundedSender<Worker>,
    done_tx: mpsc::UnboundedSender<WorkerId>,
    fail_tx: mpsc::UnboundedSender<(WorkerId, WorkerError)>,
    live: watch::Receiver<Vec<LiveWorker>>,
}

impl ControllerHandle {
    /// Queues a new worker; it starts on the owner's next integration.
    pub fn submit(&self, worker: Worker) -> Result<(), SubmitError> {
        self.create_tx.send(worker).map_err(|_| SubmitError::Closed)
    }

    /// Reports that `id` finished (or, from the outgoing listener, that its client left).
    pub fn notify_completion(&self, id: WorkerId) {
        if self.done_tx.send(id).is_err() {
            debug!(worker = %id, "completion dropped, controller gone");
        }
    }

    /// Reports that `id` exhausted its fault tolerance.
    pub fn notify_failure(&self, id: WorkerId, error: WorkerError) {
        if let Err(e) = self.fail_tx.send((id, error)) {
            let (id, error) = e.0;
            error!(worker = %id, err = %error, "failure dropped, controller gone");
        }
    }

    /// Ids of currently registered workers, in promotion order.
    pub fn current_ids(&self) -> Vec<WorkerId> {
        self.live.borrow().iter().map(|w| w.id).collect()
    }

    /// Ids and statuses of currently registered workers, in promotion order.
    pub fn snapshot(&self) -> Vec<LiveWorker> {
        self.live.borrow().clone()
    }
}

/// Owner-side registry of live workers.
pub struct Controller {
    registry: HashMap<WorkerId, WorkerRecord>,
    departed: HashMap<WorkerId, Instant>,
    next_seq: u64,
    create_rx: mpsc::UnboundedReceiver<Worker>,
    done_rx: mpsc::UnboundedReceiver<WorkerId>,
    fail_rx: mpsc::UnboundedReceiver<(WorkerId, WorkerError)>,
    live_tx: watch::Sender<Vec<LiveWorker>>,
    handle: ControllerHandle,
    bus: Bus,
}

impl Controller {
    /// Creates an empty controller.
    pub fn new(bus: Bus) -> Self {
        let (create_tx, create_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (fail_tx, fail_rx) = mpsc::unbounded_channel();
        let (live_tx, live) = watch::channel(Vec::new());

        Self {
            registry: HashMap::new(),
            departed: HashMap::new(),
            next_seq: 0,
            create_rx,
            done_rx,
            fail_rx,
            live_tx,
            handle: ControllerHandle {
                create_tx,
                done_tx,
                fail_tx,
                live,
            },
            bus,
        }
    }

    /// Returns a handle for other threads.
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Drains the creation queue: registers and starts every new worker.
    ///
    /// Stops at the first thread that cannot be spawned and returns that error;
    /// workers queued behind it stay queued.
    pub fn integrate_new(&mut self) -> Result<usize, ControllerError> {
        self.departed.retain(|_, at| at.elapsed() < DEPARTURE_TTL);
        let mut added = 0;
        let mut res = Ok(());
        while let Ok(worker) = self.create_rx.try_recv() {
            match self.start(worker) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => {
                    res = Err(e);
                    break;
                }
            }
        }
        if added > 0 {
            self.publish_live();
        }
        res.map(|()| added)
    }

    /// Drains the completion queue, then removes every record whose thread exited.
    ///
    /// A completion for a still-running worker (a departed client) kills it; its
    /// record is kept as `Stopping` until the thread is gone. A completion for a
    /// client not registered yet is remembered so its pending arrival is rejected.
    pub fn reap_completed(&mut self) -> usize {
        while let Ok(id) = self.done_rx.try_recv() {
            match self.registry.get_mut(&id) {
                Some(rec) => Self::signal(rec),
                None if id.is_client() => {
                    debug!(worker = %id, "departure before arrival");
                    self.departed.insert(id, Instant::now());
                }
                None => {}
            }
        }

        let exited: Vec<WorkerId> = self
            .registry
            .values()
            .filter(|r| r.handle.is_finished())
            .map(|r| r.id)
            .collect();
        for id in &exited {
            if let Some(mut rec) = self.registry.remove(id) {
                rec.status = WorkerStatus::Stopped;
                match rec.handle.join() {
                    Ok(exit) => debug!(worker = %rec.id, reason = exit.as_label(), "reaped"),
                    Err(payload) => {
                        error!(worker = %rec.id, panic = %panic_message(&*payload), "worker thread panicked")
                    }
                }
            }
        }

        self.publish_live();
        exited.len()
    }

    /// Pops at most one failure; if present, kills every worker and reports it.
    pub fn check_failures(&mut self) -> Result<(), RuntimeError> {
        match self.fail_rx.try_recv() {
            Ok((id, error)) => {
                error!(worker = %id, err = %error, "worker failed, killing 'em all");
                self.kill_all();
                Err(RuntimeError::WorkerFailed { id, error })
            }
            Err(_) => Ok(()),
        }
    }

    /// Best-effort kill of one worker; returns `false` if it is not registered.
    pub fn kill(&mut self, id: WorkerId) -> bool {
        let Some(rec) = self.registry.get_mut(&id) else {
            return false;
        };
        Self::signal(rec);
        self.publish_live();
        true
    }

    /// Kills every registered worker.
    pub fn kill_all(&mut self) {
        for rec in self.registry.values_mut() {
            Self::signal(rec);
        }
        self.publish_live();
    }

    /// Ids of registered workers, in promotion order.
    pub fn ids(&self) -> Vec<WorkerId> {
        self.ordered().iter().map(|r| r.id).collect()
    }

    /// Status of a registered worker.
    pub fn status(&self, id: WorkerId) -> Option<WorkerStatus> {
        self.registry.get(&id).map(|r| r.status)
    }

    /// Socket paths of every registered listener.
    pub fn socket_paths(&self) -> Vec<PathBuf> {
        self.ordered()
            .iter()
            .filter_map(|r| r.socket_path.clone())
            .collect()
    }

    /// Registered workers whose threads are still running.
    pub fn unfinished(&self) -> Vec<WorkerId> {
        self.ordered()
            .iter()
            .filter(|r| !r.handle.is_finished())
            .map(|r| r.id)
            .collect()
    }

    /// Returns `true` once every registered thread has exited.
    pub fn all_finished(&self) -> bool {
        self.registry.values().all(|r| r.handle.is_finished())
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Returns `true` if no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    /// Registers and starts one worker; `Ok(false)` if rejected as a duplicate.
    fn start(&mut self, worker: Worker) -> Result<bool, ControllerError> {
        let id = worker.id();
        if let Some(existing) = self.registry.get(&id) {
            warn!(worker = %id, status = ?existing.status, "duplicate worker id, submission rejected");
            self.bus.publish(
                Event::new(EventKind::WorkerRejected)
                    .with_worker(id)
                    .with_reason("duplicate_id"),
            );
            return Ok(false);
        }
        if self.departed.remove(&id).is_some() {
            info!(worker = %id, "client already departed, submission rejected");
            self.bus.publish(
                Event::new(EventKind::WorkerRejected)
                    .with_worker(id)
                    .with_reason("already_departed"),
            );
            return Ok(false);
        }

        let kill = worker.kill_token();
        let socket_path = worker.socket_path();
        let probe = worker.phase_probe();
        let ctl = self.handle.clone();
        let bus = self.bus.clone();
        let handle = thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || worker.run(ctl, bus))
            .map_err(|source| ControllerError::Spawn { id, source })?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.registry.insert(
            id,
            WorkerRecord {
                id,
                handle,
                kill,
                status: WorkerStatus::Running,
                socket_path,
                probe,
                seq,
            },
        );
        self.bus
            .publish(Event::new(EventKind::WorkerAdded).with_worker(id));
        Ok(true)
    }

    fn signal(rec: &mut WorkerRecord) {
        rec.kill.cancel();
        if rec.status == WorkerStatus::Running {
            rec.status = WorkerStatus::Stopping;
        }
    }

    fn ordered(&self) -> Vec<&WorkerRecord> {
        let mut recs: Vec<&WorkerRecord> = self.registry.values().collect();
        recs.sort_unstable_by_key(|r| r.seq);
        recs
    }

    fn publish_live(&self) {
        let live = self
            .ordered()
            .into_iter()
            .map(|r| LiveWorker {
                id: r.id,
                status: r.status,
                probe: r.probe.clone(),
            })
            .collect();
        self.live_tx.send_replace(live);
    }

    #[cfg(test)]
    pub(crate) fn drain_completions(&mut self) -> Vec<WorkerId> {
        let mut ids = Vec::new();
        while let Ok(id) = self.done_rx.try_recv() {
            ids.push(id);
        }
        ids
    }
}
