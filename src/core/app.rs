//! # App: the owner thread's supervision cycle and shutdown sequence.
//!
//! The [`App`] owns the [`Controller`], the event bus and the subscribers. It starts
//! the control workers, then runs the supervision cycle until either an OS signal
//! arrives (operator stop) or the cycle reports a fatal condition.
//!
//! ## High-level architecture
//! ```text
//! run_until(stop):
//!   SubscriberSet::new(subs).forward(stop)   Bus ─► forwarder task ─► SubscriberSet::emit
//!   submit(in, [in_cli], out, pinger)
//!
//!   select! {
//!     stop                         ─► ShutdownRequested
//!     supervise() loop {
//!         check_failures()?        ─► fatal: WorkerFailed (every worker already killed)
//!         reap_completed()
//!         integrate_new()?
//!         sleep(cycle_floor - elapsed)
//!     }                            ─► FatalFailure
//!   }
//!
//! Shutdown path:
//!   kill_all()
//!   ping every socket              (wakes listeners blocked in accept)
//!   remove every socket file
//!   poll reap_completed()/unfinished() up to `grace`:
//!       ├─ all exited  → AllStoppedWithin
//!       └─ deadline    → GraceExceeded (stuck worker ids)
//! ```
//!
//! ## Rules
//! - The cycle is synchronous; cancellation only happens between two cycles.
//! - A panic inside the cycle is caught and treated like any fatal condition.
//! - Faults during shutdown are logged and swallowed.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::controller::{Controller, ControllerHandle};
use crate::core::shutdown;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::listeners::{WorkerFactory, ping, remove_socket_file};
use crate::recorder::Recorder;
use crate::subscribers::{Subscribe, SubscriberSet, panic_message};

/// Stand-in deadline for a span too long to add to an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The daemon: control workers, supervision cycle and shutdown.
pub struct App {
    cfg: Config,
    bus: Bus,
    controller: Controller,
    factory: WorkerFactory,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl App {
    /// Creates the daemon; nothing runs until [`App::run`].
    pub fn new(
        cfg: Config,
        recorder: Arc<dyn Recorder>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let controller = Controller::new(bus.clone());
        let factory = WorkerFactory::new(&cfg, recorder);
        Self {
            cfg,
            bus,
            controller,
            factory,
            subscribers,
        }
    }

    /// Handle on the controller, usable from any thread.
    pub fn handle(&self) -> ControllerHandle {
        self.controller.handle()
    }

    /// Event bus shared with every worker.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runs until an OS termination signal or a fatal condition.
    pub async fn run(self) -> Result<(), RuntimeError> {
        self.run_until(async {
            if let Err(e) = shutdown::wait_for_shutdown_signal().await {
                error!(err = %e, "cannot listen for termination signals");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs until `stop` completes or a fatal condition.
    ///
    /// Returns `Ok(())` when `stop` fired and every worker exited within the grace
    /// period.
    pub async fn run_until<F>(mut self, stop: F) -> Result<(), RuntimeError>
    where
        F: Future<Output = ()>,
    {
        let forward_stop = CancellationToken::new();
        let forwarder = SubscriberSet::new(self.subscribers.clone(), self.bus.clone())
            .forward(forward_stop.clone());
        self.start_control_workers();

        let fatal = tokio::select! {
            _ = stop => None,
            err = self.supervise() => Some(err),
        };

        match &fatal {
            None => {
                info!("shutdown requested");
                self.bus.publish(Event::new(EventKind::ShutdownRequested));
            }
            Some(err) => {
                error!(err = %err, label = err.as_label(), "fatal failure, shutting down");
                let mut ev = Event::new(EventKind::FatalFailure).with_reason(err.to_string());
                if let RuntimeError::WorkerFailed { id, .. } = err {
                    ev = ev.with_worker(*id);
                }
                self.bus.publish(ev);
            }
        }

        let drained = self.shut_down().await;

        forward_stop.cancel();
        if let Err(e) = forwarder.await {
            warn!(err = %e, "event forwarder ended abnormally");
        }

        match (fatal, drained) {
            (Some(err), Err(grace)) => {
                warn!(err = %grace, "grace period exceeded after fatal failure");
                Err(err)
            }
            (Some(err), Ok(())) => Err(err),
            (None, res) => res,
        }
    }

    fn start_control_workers(&self) {
        let handle = self.controller.handle();
        for worker in self.factory.control_workers(&handle, self.cfg.enable_cli) {
            let id = worker.id();
            if handle.submit(worker).is_err() {
                warn!(worker = %id, "control worker dropped, controller closed");
            }
        }
    }

    /// Runs supervision cycles until one reports a fatal condition.
    async fn supervise(&mut self) -> RuntimeError {
        let floor = self.cfg.cycle_floor();
        loop {
            let started = Instant::now();
            if let Err(err) = self.cycle() {
                return err;
            }
            tokio::time::sleep_until(deadline_after(started, floor)).await;
        }
    }

    /// One supervision cycle, panics included.
    fn cycle(&mut self) -> Result<(), RuntimeError> {
        let ctl = &mut self.controller;
        guarded(|| {
            ctl.check_failures()?;
            ctl.reap_completed();
            ctl.integrate_new()?;
            Ok(())
        })
    }

    /// Kills every worker and waits up to the grace period for their threads.
    async fn shut_down(&mut self) -> Result<(), RuntimeError> {
        self.controller.kill_all();

        let paths = self.controller.socket_paths();
        for path in &paths {
            ping(path);
        }
        for path in &paths {
            if let Err(e) = remove_socket_file(path) {
                warn!(path = %path.display(), err = %e, "cannot remove socket file");
            }
        }

        let grace = self.cfg.grace();
        let deadline = deadline_after(Instant::now(), grace);
        let poll = self.cfg.cycle_floor().min(Duration::from_millis(100));
        loop {
            self.controller.reap_completed();
            if self.controller.all_finished() {
                debug!("every worker exited");
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                return Ok(());
            }
            if Instant::now() >= deadline {
                let stuck = self.controller.unfinished();
                let ids: Vec<String> = stuck.iter().map(ToString::to_string).collect();
                self.bus
                    .publish(Event::new(EventKind::GraceExceeded).with_reason(ids.join(",")));
                return Err(RuntimeError::GraceExceeded { grace, stuck });
            }
            tokio::time::sleep(poll.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}

/// Runs `f`, turning a panic into [`RuntimeError::CyclePanicked`].
fn guarded<F>(f: F) -> Result<(), RuntimeError>
where
    F: FnOnce() -> Result<(), RuntimeError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(res) => res,
        Err(payload) => Err(RuntimeError::CyclePanicked(panic_message(&*payload))),
    }
}

fn deadline_after(start: Instant, span: Duration) -> Instant {
    start
        .checked_add(span)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorkerId;
    use crate::error::WorkerError;

    #[test]
    fn cycle_panic_becomes_fatal() {
        let err = guarded(|| panic!("registry corrupted")).unwrap_err();
        match err {
            RuntimeError::CyclePanicked(msg) => assert!(msg.contains("registry corrupted")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn cycle_errors_pass_through() {
        assert!(guarded(|| Ok(())).is_ok());
        let err = guarded(|| {
            Err(RuntimeError::WorkerFailed {
                id: WorkerId::Client(3),
                error: WorkerError::Framing("x".into()),
            })
        })
        .unwrap_err();
        assert!(matches!(err, RuntimeError::WorkerFailed { .. }));
    }

    #[test]
    fn huge_spans_do_not_overflow() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::from_secs(1)), now + Duration::from_secs(1));
        assert!(deadline_after(now, Duration::MAX) > now + Duration::from_secs(86_400));
    }
}
