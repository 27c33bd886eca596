//! # Daemon configuration.
//!
//! [`Config`] gathers every tunable of the daemon. It deserializes from TOML with
//! every field defaulted, so an empty file (or no file at all) is a valid setup.
//!
//! ```toml
//! socket_prefix = "/tmp/coverd"
//! data_idle_secs = 60
//! enable_cli = true
//!
//! [fault]
//! max_faults = 3
//! window_secs = 300
//!
//! [logging]
//! level = "info"
//! format = "text"
//!
//! [recorder]
//! kind = "memory"
//! capacity = 100000
//! ```
//!
//! ## Sentinel values
//! - `data_idle_secs = 0` → data workers never time out
//! - `recv_timeout_ms = 0` → reads block until data or hang-up
//! - `grace_secs = 0` → do not wait for workers at shutdown
//!
//! Every duration is capped at [`MAX_SPAN_SECS`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policies::FaultPolicy;

/// Longest accepted duration of any setting, in seconds (one day).
pub const MAX_SPAN_SECS: u64 = 24 * 60 * 60;

/// Owner reported by `--print-owner` when none is configured.
pub const DEFAULT_OWNER: &str = "root";

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Socket paths are `{socket_prefix}_{id}`.
    pub socket_prefix: PathBuf,
    /// Seconds a data worker may go without a message before leaving (`0` = never).
    pub data_idle_secs: u64,
    /// Read timeout on accepted connections, in milliseconds (`0` = none).
    pub recv_timeout_ms: u64,
    /// Minimum duration of one supervision cycle, in milliseconds.
    pub cycle_floor_ms: u64,
    /// Maximum wait for worker threads at shutdown, in seconds.
    pub grace_secs: u64,
    /// Pause of the pinger between two sweeps, in milliseconds.
    pub ping_interval_ms: u64,
    /// Also listen on the `in_cli` socket (command-line clients).
    pub enable_cli: bool,
    /// Capacity of the event bus.
    pub bus_capacity: usize,
    /// User the daemon is expected to run as.
    pub daemon_owner: Option<String>,
    /// Per-worker fault tolerance.
    pub fault: FaultConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Recorder selection.
    pub recorder: RecorderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_prefix: PathBuf::from("/tmp/coverd"),
            data_idle_secs: 60,
            recv_timeout_ms: 1000,
            cycle_floor_ms: 50,
            grace_secs: 60,
            ping_interval_ms: 1000,
            enable_cli: true,
            bus_capacity: 1024,
            daemon_owner: None,
            fault: FaultConfig::default(),
            logging: LoggingConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl Config {
    /// Reads, parses and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.socket_prefix.as_os_str().is_empty() {
            errors.push("socket_prefix must not be empty".to_string());
        } else if self.socket_prefix.file_name().is_none() {
            errors.push("socket_prefix must end with a file name".to_string());
        }
        if self.cycle_floor_ms == 0 {
            errors.push("cycle_floor_ms must be positive".to_string());
        }
        if self.ping_interval_ms == 0 {
            errors.push("ping_interval_ms must be positive".to_string());
        }
        let spans = [
            ("data_idle_secs", self.data_idle_secs, 1),
            ("recv_timeout_ms", self.recv_timeout_ms, 1000),
            ("cycle_floor_ms", self.cycle_floor_ms, 1000),
            ("grace_secs", self.grace_secs, 1),
            ("ping_interval_ms", self.ping_interval_ms, 1000),
            ("fault.window_secs", self.fault.window_secs, 1),
            ("fault.backpressure_ms", self.fault.backpressure_ms, 1000),
        ];
        for (name, value, per_sec) in spans {
            if value > MAX_SPAN_SECS * per_sec {
                errors.push(format!(
                    "{name} must be at most {} ({MAX_SPAN_SECS}s)",
                    MAX_SPAN_SECS * per_sec
                ));
            }
        }
        if self.bus_capacity == 0 {
            errors.push("bus_capacity must be positive".to_string());
        }
        if self.fault.window_secs == 0 {
            errors.push("fault.window_secs must be positive".to_string());
        }
        if self.recorder.capacity == 0 {
            errors.push("recorder.capacity must be positive".to_string());
        }
        if matches!(&self.daemon_owner, Some(owner) if owner.trim().is_empty()) {
            errors.push("daemon_owner must not be blank".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Idle span of data workers, `None` when they never time out.
    #[inline]
    pub fn data_idle_span(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.data_idle_secs)).filter(|d| !d.is_zero())
    }

    /// Read timeout on accepted connections, `None` for blocking reads.
    #[inline]
    pub fn recv_timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.recv_timeout_ms)).filter(|d| !d.is_zero())
    }

    #[inline]
    pub fn cycle_floor(&self) -> Duration {
        Duration::from_millis(self.cycle_floor_ms)
    }

    #[inline]
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    #[inline]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Fault policy shared by every worker.
    pub fn fault_policy(&self) -> FaultPolicy {
        FaultPolicy {
            max_faults: self.fault.max_faults,
            window: Duration::from_secs(self.fault.window_secs),
            backpressure: Duration::from_millis(self.fault.backpressure_ms),
        }
    }

    /// Configured owner, or [`DEFAULT_OWNER`].
    pub fn owner(&self) -> &str {
        self.daemon_owner.as_deref().unwrap_or(DEFAULT_OWNER)
    }
}

/// Fault tolerance of a single worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaultConfig {
    /// Faults tolerated inside one window.
    pub max_faults: usize,
    /// Length of the sliding window, in seconds.
    pub window_secs: u64,
    /// Pause after an absorbed fault, in milliseconds.
    pub backpressure_ms: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_faults: 3,
            window_secs: 300,
            backpressure_ms: 1000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Raises the level by `steps` (one per `-v`), saturating at trace.
    pub fn raised(self, steps: u8) -> Self {
        const ORDER: [LogLevel; 5] = [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ];
        let at = ORDER.iter().position(|l| *l == self).unwrap_or(2);
        ORDER[(at + steps as usize).min(ORDER.len() - 1)]
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

/// Which recorder receives coverage events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderKind {
    /// Log every event.
    Log,
    /// Keep a capped in-memory store.
    Memory,
}

/// Recorder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecorderConfig {
    pub kind: RecorderKind,
    /// Distinct records kept by the memory recorder.
    pub capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            kind: RecorderKind::Memory,
            capacity: 100_000,
        }
    }
}
