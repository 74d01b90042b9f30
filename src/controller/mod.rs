//! The adaptive control loop
//!
//! ```text
//! INIT -> ITERATE -> DISPATCH -> ACCUMULATE -> CHECK_STABILITY
//!            ^                                      |
//!            +-------------- CONTINUE --------------+--> STOP_STABLE | STOP_MAX
//! ```

pub mod config;
pub mod engine;
pub mod output;
pub mod state;

pub use config::ControllerConfig;
pub use engine::ControlLoop;
pub use output::{build, ExecutionOutput, RunSummary, TerminationReason};
pub use state::{LoopState, MetricHistory};
