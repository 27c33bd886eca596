//! # Fault buffer: rate-limited absorption of worker faults.
//!
//! [`FaultBuffer`] lets a worker survive rare transient errors while bounding how
//! fast a flapping worker may burn CPU. It is parameterized by [`FaultPolicy`]:
//! - [`FaultPolicy::max_faults`] faults are tolerated...
//! - ...within any sliding [`FaultPolicy::window`];
//! - each tolerated fault blocks the caller for [`FaultPolicy::backpressure`].
//!
//! ```text
//! absorb(err)
//!   ├─► prune faults older than `window`
//!   ├─► push (now, err)
//!   ├─► len > max_faults ─► log every buffered fault, return false (escalate)
//!   └─► sleep(backpressure), return true
//! ```
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use coverd::{FaultBuffer, FaultPolicy};
//!
//! let mut buf = FaultBuffer::new(FaultPolicy {
//!     max_faults: 1,
//!     window: Duration::from_secs(60),
//!     backpressure: Duration::ZERO,
//! });
//! assert!(buf.absorb("first"));
//! assert!(!buf.absorb("second"));
//! ```

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::{Duration, Instant};

use tracing::error;

/// Fault tolerance parameters of a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultPolicy {
    /// Maximum number of faults tolerated inside one window.
    pub max_faults: usize,
    /// Sliding window length.
    pub window: Duration,
    /// Delay imposed on the caller after each tolerated fault.
    pub backpressure: Duration,
}

impl Default for FaultPolicy {
    /// Default policy:
    ///
    /// - `max_faults = 3`;
    /// - `window = 300s`;
    /// - `backpressure = 1s`.
    fn default() -> Self {
        Self {
            max_faults: 3,
            window: Duration::from_secs(300),
            backpressure: Duration::from_secs(1),
        }
    }
}

/// One buffered fault.
#[derive(Clone, Debug)]
pub struct FaultRecord {
    /// When the fault was absorbed.
    pub at: Instant,
    /// Rendered error.
    pub error: String,
}

/// Sliding-window fault counter owned by a single worker.
#[derive(Debug)]
pub struct FaultBuffer {
    policy: FaultPolicy,
    faults: VecDeque<FaultRecord>,
}

impl FaultBuffer {
    /// Creates an empty buffer.
    pub fn new(policy: FaultPolicy) -> Self {
        Self {
            policy,
            faults: VecDeque::new(),
        }
    }

    /// Absorbs `error`; returns `false` when the fault rate is exceeded.
    ///
    /// On success the calling thread is blocked for the policy's back-pressure delay.
    pub fn absorb(&mut self, error: impl Display) -> bool {
        let ok = self.absorb_at(Instant::now(), error);
        if ok && !self.policy.backpressure.is_zero() {
            std::thread::sleep(self.policy.backpressure);
        }
        ok
    }

    /// Number of faults currently inside the window.
    pub fn len(&self) -> usize {
        self.faults.len()
    }

    /// Returns `true` if no fault is buffered.
    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// Clock-explicit core of [`absorb`](Self::absorb); never sleeps.
    pub(crate) fn absorb_at(&mut self, now: Instant, error: impl Display) -> bool {
        self.prune(now);
        self.faults.push_back(FaultRecord {
            at: now,
            error: error.to_string(),
        });

        if self.faults.len() > self.policy.max_faults {
            error!(
                faults = self.faults.len(),
                window = ?self.policy.window,
                "too many faults too quickly"
            );
            for f in &self.faults {
                error!(age = ?now.saturating_duration_since(f.at), "buffered fault: {}", f.error);
            }
            return false;
        }
        true
    }

    /// Forgets faults older than the window.
    fn prune(&mut self, now: Instant) {
        let window = self.policy.window;
        while let Some(front) = self.faults.front() {
            if now.saturating_duration_since(front.at) >= window {
                self.faults.pop_front();
            } else {
                break;
            }
        }
    }
}
