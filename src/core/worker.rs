//! # Worker: one supervised unit of repeated work on its own OS thread.
//!
//! A [`Worker`] pairs a [`WorkerId`] with a pluggable [`Work`] step, a kill flag and
//! a private [`FaultBuffer`]. Its thread runs:
//!
//! ```text
//! loop {
//!   ├─► work.do_work()                       (one small, fast step)
//!   │     ├─ Ok(Continue) ─► keep going
//!   │     ├─ Ok(Done)     ─► exit Done       (graceful self-termination)
//!   │     └─ Err(e) / panic
//!   │          ├─ faults.absorb(e) ─► publish FaultAbsorbed, keep going
//!   │          └─ overflow        ─► notify_failure(id, e), exit Failed
//!   └─► kill flag set? ─► exit Killed
//! }
//! work.clean_up(killed)        (exactly once, every exit path)
//! publish WorkerStopped
//! notify_completion(id)
//! ```
//!
//! ## Rules
//! - A kill is cooperative: it is observed **between** steps, never inside one.
//! - A kill is never absorbed as a fault.
//! - Clean-up runs before completion is reported, so an observer that sees the
//!   completion also sees the released resources.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::controller::ControllerHandle;
use crate::core::id::WorkerId;
use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};
use crate::listeners::PhaseProbe;
use crate::policies::{FaultBuffer, FaultPolicy};
use crate::subscribers::panic_message;

/// Outcome of a single work step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Call `do_work` again.
    Continue,
    /// The worker has nothing left to do and may stop.
    Done,
}

/// Why a worker thread left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The work reported [`Step::Done`].
    Done,
    /// A kill was requested.
    Killed,
    /// The fault buffer overflowed.
    Failed,
}

impl WorkerExit {
    /// Returns a short stable label for logs and events.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerExit::Done => "done",
            WorkerExit::Killed => "killed",
            WorkerExit::Failed => "failed",
        }
    }
}

/// # The extension point of a worker.
///
/// Implementors provide one elementary step rather than an internal loop, so that
/// kill checks interleave with the work at fine granularity.
pub trait Work: Send + 'static {
    /// Performs one short step.
    fn do_work(&mut self) -> Result<Step, WorkerError>;

    /// Releases resources; `killed` tells whether a kill order caused the stop.
    fn clean_up(&mut self, _killed: bool) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Filesystem socket owned by this work, if any.
    fn socket_path(&self) -> Option<PathBuf> {
        None
    }

    /// Live view of the listener phase, if this work is a listener.
    fn phase_probe(&self) -> Option<PhaseProbe> {
        None
    }
}

/// A supervised worker, not yet started.
///
/// Built by any thread, handed to [`ControllerHandle::submit`], and started by the
/// owner when the controller integrates it.
pub struct Worker {
    id: WorkerId,
    work: Box<dyn Work>,
    kill: CancellationToken,
    faults: FaultBuffer,
}

impl Worker {
    /// Creates a worker running `work` under the given fault policy.
    pub fn new(id: WorkerId, work: impl Work, policy: FaultPolicy) -> Self {
        Self {
            id,
            work: Box::new(work),
            kill: CancellationToken::new(),
            faults: FaultBuffer::new(policy),
        }
    }

    /// Identity of this worker.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Socket owned by the underlying work, if any.
    pub fn socket_path(&self) -> Option<PathBuf> {
        self.work.socket_path()
    }

    pub(crate) fn phase_probe(&self) -> Option<PhaseProbe> {
        self.work.phase_probe()
    }

    /// Kill flag shared with the controller.
    pub(crate) fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Runs the work loop to completion on the calling thread.
    pub(crate) fn run(mut self, controller: ControllerHandle, bus: Bus) -> WorkerExit {
        debug!(worker = %self.id, "starting");
        let exit = self.work_loop(&controller, &bus);

        let killed = exit == WorkerExit::Killed;
        if let Err(e) = self.work.clean_up(killed) {
            warn!(worker = %self.id, err = %e, label = e.as_label(), "clean-up failed");
        }
        debug!(worker = %self.id, reason = exit.as_label(), "stopped and cleaned up");

        bus.publish(
            Event::new(EventKind::WorkerStopped)
                .with_worker(self.id)
                .with_reason(exit.as_label()),
        );
        controller.notify_completion(self.id);
        exit
    }

    fn work_loop(&mut self, controller: &ControllerHandle, bus: &Bus) -> WorkerExit {
        loop {
            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Done) => return WorkerExit::Done,
                Err(e) => {
                    let rendered = e.to_string();
                    if !self.faults.absorb(&rendered) {
                        error!(worker = %self.id, err = %rendered, label = e.as_label(), "fault tolerance exhausted");
                        bus.publish(
                            Event::new(EventKind::WorkerFailed)
                                .with_worker(self.id)
                                .with_reason(rendered),
                        );
                        controller.notify_failure(self.id, e);
                        return WorkerExit::Failed;
                    }
                    bus.publish(
                        Event::new(EventKind::FaultAbsorbed)
                            .with_worker(self.id)
                            .with_reason(rendered),
                    );
                }
            }

            if self.kill.is_cancelled() {
                debug!(worker = %self.id, "ordered to die");
                return WorkerExit::Killed;
            }
        }
    }

    /// One `do_work` call with panics turned into faults.
    fn step(&mut self) -> Result<Step, WorkerError> {
        let work = &mut self.work;
        match panic::catch_unwind(AssertUnwindSafe(|| work.do_work())) {
            Ok(res) => res,
            Err(payload) => Err(WorkerError::Panicked(panic_message(&*payload))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::core::controller::Controller;

    /// Scripted work: replays `steps`, then `Continue` forever.
    struct Scripted {
        steps: Vec<Result<Step, WorkerError>>,
        cleanups: Arc<AtomicUsize>,
        killed: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(mut steps: Vec<Result<Step, WorkerError>>) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            steps.reverse();
            let cleanups = Arc::new(AtomicUsize::new(0));
            let killed = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    steps,
                    cleanups: cleanups.clone(),
                    killed: killed.clone(),
                },
                cleanups,
                killed,
            )
        }
    }

    impl Work for Scripted {
        fn do_work(&mut self) -> Result<Step, WorkerError> {
            match self.steps.pop() {
                Some(step) => step,
                None => {
                    std::thread::sleep(Duration::from_millis(1));
                    Ok(Step::Continue)
                }
            }
        }

        fn clean_up(&mut self, killed: bool) -> Result<(), WorkerError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            if killed {
                self.killed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    fn quiet_policy(max_faults: usize) -> FaultPolicy {
        FaultPolicy {
            max_faults,
            window: Duration::from_secs(300),
            backpressure: Duration::ZERO,
        }
    }

    #[test]
    fn done_cleans_up_once_and_reports_completion() {
        let bus = Bus::new(16);
        let mut ctl = Controller::new(bus.clone());
        let (work, cleanups, killed) = Scripted::new(vec![Ok(Step::Continue), Ok(Step::Done)]);
        let worker = Worker::new(WorkerId::Client(7), work, quiet_policy(3));

        assert_eq!(worker.run(ctl.handle(), bus), WorkerExit::Done);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(killed.load(Ordering::SeqCst), 0);
        assert_eq!(ctl.drain_completions(), vec![WorkerId::Client(7)]);
    }

    #[test]
    fn kill_is_observed_between_steps() {
        let bus = Bus::new(16);
        let mut ctl = Controller::new(bus.clone());
        let (work, cleanups, killed) = Scripted::new(vec![]);
        let worker = Worker::new(WorkerId::Client(8), work, quiet_policy(3));
        worker.kill_token().cancel();

        assert_eq!(worker.run(ctl.handle(), bus), WorkerExit::Killed);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(killed.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.drain_completions(), vec![WorkerId::Client(8)]);
    }

    #[test]
    fn absorbed_faults_keep_the_worker_alive() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let ctl = Controller::new(bus.clone());
        let (work, _, _) = Scripted::new(vec![
            Err(WorkerError::Framing("bad".into())),
            Err(WorkerError::Framing("bad".into())),
            Ok(Step::Done),
        ]);
        let worker = Worker::new(WorkerId::Client(9), work, quiet_policy(3));

        assert_eq!(worker.run(ctl.handle(), bus), WorkerExit::Done);
        assert_eq!(rx.try_recv().map(|e| e.kind).ok(), Some(EventKind::FaultAbsorbed));
        assert_eq!(rx.try_recv().map(|e| e.kind).ok(), Some(EventKind::FaultAbsorbed));
        assert_eq!(rx.try_recv().map(|e| e.kind).ok(), Some(EventKind::WorkerStopped));
    }

    #[test]
    fn overflow_reports_failure_then_completion() {
        let bus = Bus::new(16);
        let mut ctl = Controller::new(bus.clone());
        let (work, cleanups, killed) = Scripted::new(vec![
            Err(WorkerError::Framing("1".into())),
            Err(WorkerError::Framing("2".into())),
        ]);
        let worker = Worker::new(WorkerId::Client(10), work, quiet_policy(1));

        assert_eq!(worker.run(ctl.handle(), bus), WorkerExit::Failed);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(killed.load(Ordering::SeqCst), 0);

        let failure = ctl.check_failures().expect_err("failure must be fatal");
        assert_eq!(failure.as_label(), "runtime_worker_failed");
        assert_eq!(ctl.drain_completions(), vec![WorkerId::Client(10)]);
    }

    #[test]
    fn panics_are_faults() {
        struct Boom;
        impl Work for Boom {
            fn do_work(&mut self) -> Result<Step, WorkerError> {
                panic!("step exploded");
            }
        }

        let bus = Bus::new(16);
        let mut ctl = Controller::new(bus.clone());
        let worker = Worker::new(WorkerId::Client(11), Boom, quiet_policy(0));

        assert_eq!(worker.run(ctl.handle(), bus), WorkerExit::Failed);
        match ctl.check_failures() {
            Err(crate::RuntimeError::WorkerFailed { error, .. }) => {
                assert!(matches!(error, WorkerError::Panicked(msg) if msg.contains("step exploded")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
