//! Error types used by the coverd runtime, its workers and its collaborators.
//!
//! This module defines the error enums of the crate:
//!
//! - [`WorkerError`]: a fault raised by one step of a worker.
//! - [`StoreError`]: a failure reported by a [`Recorder`](crate::Recorder).
//! - [`SubmitError`] / [`ControllerError`]: handoff and thread-spawn failures.
//! - [`RuntimeError`]: conditions that end the supervision cycle.
//! - [`ConfigError`]: configuration loading and validation failures.
//!
//! Each type provides `as_label` for a stable snake_case label used in logs.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::WorkerId;

/// # Errors produced by a single worker step.
///
/// Every variant is a *transient* fault from the worker's point of view: it is
/// handed to the worker's [`FaultBuffer`](crate::FaultBuffer) and only becomes
/// fatal once the buffer overflows.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Plain I/O failure on an accepted connection.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Failure while preparing or binding the listener socket.
    #[error("socket {path:?}: {source}")]
    Socket {
        /// Socket path involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The recorder refused an event.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A framed message could not be decoded.
    #[error("framing error: {0}")]
    Framing(String),

    /// A control message did not carry a valid process id.
    #[error("invalid process id {0:?}")]
    InvalidPid(String),

    /// The controller is gone; nothing can be handed off anymore.
    #[error("controller closed")]
    ControllerClosed,

    /// The work step panicked.
    #[error("work step panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Io(_) => "worker_io",
            WorkerError::Socket { .. } => "worker_socket",
            WorkerError::Store(_) => "worker_store",
            WorkerError::Framing(_) => "worker_framing",
            WorkerError::InvalidPid(_) => "worker_invalid_pid",
            WorkerError::ControllerClosed => "worker_controller_closed",
            WorkerError::Panicked(_) => "worker_panicked",
        }
    }

    pub(crate) fn socket(path: impl Into<PathBuf>, source: io::Error) -> Self {
        WorkerError::Socket {
            path: path.into(),
            source,
        }
    }
}

/// # Errors produced by a recorder.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The raw event does not follow `path:function:line`.
    #[error("malformed event {0:?}")]
    Malformed(String),

    /// The backing store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Malformed(_) => "store_malformed",
            StoreError::Unavailable(_) => "store_unavailable",
        }
    }
}

/// Error returned by [`ControllerHandle::submit`](crate::ControllerHandle::submit).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Controller was dropped (the daemon is going down).
    #[error("controller channel closed")]
    Closed,
}

/// # Errors raised by owner-side controller operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControllerError {
    /// The OS refused to start a worker thread.
    #[error("failed to spawn thread for worker {id}: {source}")]
    Spawn {
        /// Worker that could not be started.
        id: WorkerId,
        /// Underlying error.
        source: io::Error,
    },
}

impl ControllerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::Spawn { .. } => "controller_spawn",
        }
    }
}

/// # Errors that end the supervision cycle.
///
/// Any of these moves the [`App`](crate::App) into its shutdown sequence.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A worker exhausted its fault tolerance; every worker has been killed.
    #[error("worker {id} failed fatally: {error}")]
    WorkerFailed {
        /// Failing worker.
        id: WorkerId,
        /// The fault that overflowed its buffer.
        error: WorkerError,
    },

    /// An owner-side controller operation failed.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// The supervision cycle panicked.
    #[error("supervision cycle panicked: {0}")]
    CyclePanicked(String),

    /// Shutdown grace period was exceeded; some workers were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Workers whose threads had not exited.
        stuck: Vec<WorkerId>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::WorkerFailed { .. } => "runtime_worker_failed",
            RuntimeError::Controller(_) => "runtime_controller",
            RuntimeError::CyclePanicked(_) => "runtime_cycle_panicked",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # Errors produced while loading configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The file is not valid TOML for [`Config`](crate::Config).
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// One or more fields hold invalid values.
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        let err = WorkerError::InvalidPid("abc".into());
        assert_eq!(err.as_label(), "worker_invalid_pid");
        assert_eq!(err.to_string(), "invalid process id \"abc\"");

        let err: WorkerError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.as_label(), "worker_store");

        let err = RuntimeError::GraceExceeded {
            grace: Duration::from_secs(1),
            stuck: vec![],
        };
        assert_eq!(err.as_label(), "runtime_grace_exceeded");
    }

    #[test]
    fn invalid_config_lists_every_problem() {
        let err = ConfigError::Invalid(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "invalid configuration: a; b");
    }
}
