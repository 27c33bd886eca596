//! Item handlers of the three listener kinds.
//!
//! - [`DataHandler`]: forwards each coverage event verbatim to the recorder.
//! - [`IncomingRequests`]: a client announces itself with its pid; a data worker
//!   is built and submitted for it.
//! - [`OutgoingRequests`]: a client announces its departure; its data worker is
//!   reported complete so the owner can reap it.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::{ControllerHandle, WorkerId};
use crate::error::WorkerError;
use crate::listeners::factory::WorkerFactory;
use crate::listeners::listener::ItemHandler;
use crate::recorder::Recorder;

/// Parses a decimal process id; zero is not a process.
pub fn parse_pid(item: &str) -> Result<u32, WorkerError> {
    match item.trim().parse::<u32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(WorkerError::InvalidPid(item.to_string())),
    }
}

/// Handler of data workers.
pub struct DataHandler {
    recorder: Arc<dyn Recorder>,
}

impl DataHandler {
    pub fn new(recorder: Arc<dyn Recorder>) -> Self {
        Self { recorder }
    }
}

impl ItemHandler for DataHandler {
    fn process_item(&mut self, item: &str) -> Result<(), WorkerError> {
        self.recorder.record(item)?;
        Ok(())
    }
}

/// Handler of the `in` and `in_cli` listeners.
pub struct IncomingRequests {
    controller: ControllerHandle,
    factory: WorkerFactory,
}

impl IncomingRequests {
    pub fn new(controller: ControllerHandle, factory: WorkerFactory) -> Self {
        Self {
            controller,
            factory,
        }
    }
}

impl ItemHandler for IncomingRequests {
    fn process_item(&mut self, item: &str) -> Result<(), WorkerError> {
        let pid = parse_pid(item)?;
        info!(pid, "new client");
        let worker = self.factory.data_worker(pid);
        self.controller
            .submit(worker)
            .map_err(|_| WorkerError::ControllerClosed)
    }
}

/// Handler of the `out` listener.
pub struct OutgoingRequests {
    controller: ControllerHandle,
}

impl OutgoingRequests {
    pub fn new(controller: ControllerHandle) -> Self {
        Self { controller }
    }
}

impl ItemHandler for OutgoingRequests {
    fn process_item(&mut self, item: &str) -> Result<(), WorkerError> {
        let pid = parse_pid(item)?;
        debug!(pid, "client leaving");
        self.controller.notify_completion(WorkerId::Client(pid));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use super::*;
    use crate::config::Config;
    use crate::core::Controller;
    use crate::error::StoreError;
    use crate::events::Bus;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl Recorder for Collect {
        fn record(&self, raw: &str) -> Result<(), StoreError> {
            if raw == "down" {
                return Err(StoreError::Unavailable("offline".into()));
            }
            self.0.lock().push(raw.to_string());
            Ok(())
        }
    }

    #[test]
    fn pids_are_decimal_and_positive() {
        assert_eq!(parse_pid("1234").unwrap(), 1234);
        assert_eq!(parse_pid(" 42\r").unwrap(), 42);
        for bad in ["", "0", "-1", "12ab", "99999999999"] {
            assert_eq!(parse_pid(bad).unwrap_err().as_label(), "worker_invalid_pid", "{bad:?}");
        }
    }

    #[test]
    fn data_handler_forwards_verbatim() {
        let rec = Arc::new(Collect::default());
        let mut h = DataHandler::new(rec.clone());
        h.process_item("/a/b.php:foo:10").unwrap();
        assert_eq!(h.process_item("down").unwrap_err().as_label(), "worker_store");
        assert_eq!(*rec.0.lock(), vec!["/a/b.php:foo:10".to_string()]);
    }

    #[test]
    fn incoming_submits_a_data_worker() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            socket_prefix: dir.path().join("coverd"),
            ..Config::default()
        };
        let mut ctl = Controller::new(Bus::new(16));
        let factory = WorkerFactory::new(&cfg, Arc::new(Collect::default()));
        let mut h = IncomingRequests::new(ctl.handle(), factory);

        h.process_item("1234").unwrap();
        assert!(h.process_item("nope").is_err());
        assert_eq!(ctl.integrate_new().unwrap(), 1);
        assert_eq!(ctl.ids(), vec![WorkerId::Client(1234)]);
        assert_eq!(ctl.socket_paths(), vec![dir.path().join("coverd_1234")]);

        ctl.kill_all();
        let path = dir.path().join("coverd_1234");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !ctl.unfinished().is_empty() && Instant::now() < deadline {
            crate::listeners::ping(&path);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(ctl.unfinished().is_empty());
    }

    #[test]
    fn outgoing_reports_completion() {
        let mut ctl = Controller::new(Bus::new(16));
        let mut h = OutgoingRequests::new(ctl.handle());
        h.process_item("77").unwrap();
        assert_eq!(ctl.drain_completions(), vec![WorkerId::Client(77)]);
    }
}
