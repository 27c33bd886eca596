//! End-to-end tests: a real daemon on real Unix sockets in a temporary directory.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use coverd::{
    App, Config, ControlRole, ControllerHandle, Event, EventKind, ListenerPhase, Recorder,
    RuntimeError, StoreError, Subscribe, WorkerId,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Counts every `record` call verbatim.
#[derive(Default)]
struct Calls(Mutex<Vec<String>>);

impl Recorder for Calls {
    fn record(&self, raw: &str) -> Result<(), StoreError> {
        self.0.lock().push(raw.to_string());
        Ok(())
    }
}

/// Collects event kinds.
#[derive(Default)]
struct Kinds(Mutex<Vec<EventKind>>);

#[async_trait]
impl Subscribe for Kinds {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().push(ev.kind);
    }
}

struct Daemon {
    prefix: PathBuf,
    handle: ControllerHandle,
    stop: CancellationToken,
    thread: JoinHandle<Result<(), RuntimeError>>,
}

impl Daemon {
    fn start(cfg: Config, recorder: Arc<dyn Recorder>, kinds: Arc<Kinds>) -> Self {
        let prefix = cfg.socket_prefix.clone();
        let subscribers = vec![kinds as Arc<dyn Subscribe>];
        let app = App::new(cfg, recorder, subscribers);
        let handle = app.handle();
        let stop = CancellationToken::new();
        let token = stop.clone();
        let thread = thread::spawn(move || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(app.run_until(token.cancelled_owned()))
        });
        let daemon = Self {
            prefix,
            handle,
            stop,
            thread,
        };
        wait_for(|| UnixStream::connect(daemon.path("in")).is_ok(), "in socket");
        wait_for(|| UnixStream::connect(daemon.path("out")).is_ok(), "out socket");
        daemon
    }

    fn path(&self, id: &str) -> PathBuf {
        let mut raw = self.prefix.as_os_str().to_owned();
        raw.push(format!("_{id}"));
        PathBuf::from(raw)
    }

    fn send(&self, id: &str, payload: &[u8]) {
        let mut stream = UnixStream::connect(self.path(id)).unwrap();
        stream.write_all(payload).unwrap();
    }

    fn stop(self) -> Result<(), RuntimeError> {
        self.stop.cancel();
        self.thread.join().unwrap()
    }
}

fn config(dir: &Path) -> Config {
    let mut cfg = Config {
        socket_prefix: dir.join("cov"),
        data_idle_secs: 1,
        recv_timeout_ms: 50,
        cycle_floor_ms: 10,
        grace_secs: 5,
        ping_interval_ms: 20,
        ..Config::default()
    };
    cfg.fault.backpressure_ms = 0;
    cfg
}

fn wait_for(mut cond: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn client_events_are_recorded_then_idle_worker_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(Calls::default());
    let kinds = Arc::new(Kinds::default());
    let daemon = Daemon::start(config(dir.path()), calls.clone(), kinds.clone());

    assert!(daemon.path("in_cli").exists());
    daemon.send("in", b"1234\n");
    wait_for(|| UnixStream::connect(daemon.path("1234")).is_ok(), "data socket");
    assert!(daemon.handle.current_ids().contains(&WorkerId::Client(1234)));

    daemon.send("1234", b"/a/b.php:foo:10\n\n");
    wait_for(|| !calls.0.lock().is_empty(), "record call");

    // Silent client: the data worker leaves on its own and removes its socket.
    wait_for(|| !daemon.path("1234").exists(), "idle eviction");
    wait_for(
        || !daemon.handle.current_ids().contains(&WorkerId::Client(1234)),
        "reap of idle worker",
    );
    assert_eq!(*calls.0.lock(), vec!["/a/b.php:foo:10".to_string()]);

    daemon.stop().unwrap();
    for id in ["in", "in_cli", "out"] {
        assert!(!daemon_path(dir.path(), id).exists(), "{id} socket left behind");
    }

    let kinds = kinds.0.lock();
    assert!(kinds.contains(&EventKind::ShutdownRequested));
    assert!(kinds.contains(&EventKind::AllStoppedWithin));
}

#[test]
fn departure_reaps_the_data_worker() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.data_idle_secs = 0;
    cfg.enable_cli = false;
    let daemon = Daemon::start(cfg, Arc::new(Calls::default()), Arc::new(Kinds::default()));
    assert!(!daemon.path("in_cli").exists());

    daemon.send("in", b"55\n");
    wait_for(|| UnixStream::connect(daemon.path("55")).is_ok(), "data socket");

    daemon.send("out", b"55\n");
    wait_for(
        || !daemon.handle.current_ids().contains(&WorkerId::Client(55)),
        "departed worker reaped",
    );
    assert!(!daemon.path("55").exists());
    assert!(
        daemon
            .handle
            .current_ids()
            .contains(&WorkerId::Control(ControlRole::Incoming))
    );

    daemon.stop().unwrap();
}

#[test]
fn duplicate_arrival_keeps_a_single_worker() {
    let dir = tempfile::tempdir().unwrap();
    let kinds = Arc::new(Kinds::default());
    let daemon = Daemon::start(config(dir.path()), Arc::new(Calls::default()), kinds.clone());

    daemon.send("in", b"77\n77\n");
    wait_for(|| kinds.0.lock().contains(&EventKind::WorkerRejected), "rejection");
    let clients = daemon
        .handle
        .current_ids()
        .into_iter()
        .filter(|id| *id == WorkerId::Client(77))
        .count();
    assert_eq!(clients, 1);

    daemon.stop().unwrap();
}

#[test]
fn exhausted_fault_tolerance_shuts_everything_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.fault.max_faults = 0;
    let kinds = Arc::new(Kinds::default());
    let daemon = Daemon::start(cfg, Arc::new(Calls::default()), kinds.clone());

    daemon.send("in", b"not-a-pid\n");
    let res = daemon.thread.join().unwrap();
    match res {
        Err(RuntimeError::WorkerFailed { id, .. }) => {
            assert_eq!(id, WorkerId::Control(ControlRole::Incoming));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    for id in ["in", "in_cli", "out"] {
        assert!(!daemon_path(dir.path(), id).exists(), "{id} socket left behind");
    }
    let kinds = kinds.0.lock();
    assert!(kinds.contains(&EventKind::WorkerFailed));
    assert!(kinds.contains(&EventKind::FatalFailure));
}

#[test]
fn departure_right_after_arrival_leaves_no_worker() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.data_idle_secs = 0;
    cfg.cycle_floor_ms = 200;
    let daemon = Daemon::start(cfg, Arc::new(Calls::default()), Arc::new(Kinds::default()));

    // A short-lived client: both notices usually land within one cycle.
    daemon.send("in", b"31\n");
    daemon.send("out", b"31\n");
    thread::sleep(Duration::from_millis(600));
    wait_for(
        || !daemon.handle.current_ids().contains(&WorkerId::Client(31)),
        "departed client gone",
    );
    wait_for(|| !daemon.path("31").exists(), "data socket removed");

    daemon.stop().unwrap();
}

#[test]
fn stuck_worker_exceeds_the_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.recv_timeout_ms = 0;
    cfg.data_idle_secs = 0;
    cfg.grace_secs = 1;
    let kinds = Arc::new(Kinds::default());
    let daemon = Daemon::start(cfg, Arc::new(Calls::default()), kinds.clone());

    daemon.send("in", b"66\n");
    wait_for(|| daemon.path("66").exists(), "data socket");
    // Connected and silent: the worker blocks in a read with no timeout.
    let client = UnixStream::connect(daemon.path("66")).unwrap();
    let receiving = || {
        daemon.handle.snapshot().iter().any(|w| {
            w.id == WorkerId::Client(66) && w.phase() == Some(ListenerPhase::Receiving)
        })
    };
    // A ping connection is Receiving only for an instant; ours stays.
    wait_for(receiving, "receiving data worker");
    thread::sleep(Duration::from_millis(300));
    wait_for(receiving, "receiving data worker");

    let started = Instant::now();
    match daemon.stop() {
        Err(RuntimeError::GraceExceeded { grace, stuck }) => {
            assert_eq!(grace, Duration::from_secs(1));
            assert!(stuck.contains(&WorkerId::Client(66)), "{stuck:?}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(kinds.0.lock().contains(&EventKind::GraceExceeded));
    assert!(!kinds.0.lock().contains(&EventKind::AllStoppedWithin));

    // Hang up so the stuck worker can leave.
    drop(client);
}

fn daemon_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("cov_{id}"))
}
