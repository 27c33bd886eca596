//! Fault tolerance policies.
//!
//! This module groups the knobs that decide **how many** step faults a worker may
//! absorb before its failure becomes fatal to the whole daemon.
//!
//! ## Contents
//! - [`FaultPolicy`] rate limit (max faults per sliding window) and backpressure pause
//! - [`FaultBuffer`] per-worker sliding window applying a policy
//!
//! ## Quick wiring
//! ```text
//! Config { fault: FaultConfig } ─► Config::fault_policy()
//!      └─► core::worker::Worker owns a FaultBuffer:
//!           - absorb(e) == true  → pause, keep working
//!           - absorb(e) == false → notify_failure, exit
//! ```
//!
//! ## Defaults
//! - `FaultPolicy::default()` → max_faults=3, window=300s, backpressure=1s.

mod fault;

pub use fault::{FaultBuffer, FaultPolicy, FaultRecord};
