//! Command implementation modules
//!
//! Each command is implemented as a separate module.

pub mod check;
pub mod run;
pub mod run_unit;

// Re-export command execution functions
pub use check::{run_check, CheckParams};
pub use run::{run_controller, RunParams};
pub use run_unit::run_unit;
