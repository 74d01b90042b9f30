//! # adaptive-splits
//!
//! Convergence-driven execution controller: decides at runtime how many
//! independent data splits must be evaluated before a monitored metric is
//! stable, and runs them either one by one in-process or in parallel batches
//! on a local worker pool or a cluster scheduler.
//!
//! ## Usage
//!
//! ```bash
//! adaptive-splits run run.yaml --output output.json
//! ```
//!
//! ## Modules
//!
//! - `stability` - Stability strategies, thresholds and verdicts
//! - `seed` - Deterministic, non-overlapping per-unit seeds
//! - `unit` - Unit configuration, results and evaluators
//! - `dispatch` - Sequential and parallel batch dispatchers, job schedulers
//! - `controller` - The control loop state machine and its output
//! - `config` - Run file parsing and validation
//! - `subprocess` - Process abstraction used by evaluators and schedulers
//! - `testing` - Deterministic stub evaluators
pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod seed;
pub mod stability;
pub mod subprocess;
pub mod unit;

pub mod testing;

pub use controller::{ControlLoop, ControllerConfig, ExecutionOutput, TerminationReason};
pub use error::{AdaptiveError, ErrorCode, Result};
pub use stability::{StabilityRule, StabilityStrategy, StabilityVerdict, Threshold};
