//! Error handling utilities
//!
//! This module provides centralized error handling for the application.

use tracing::error;

use crate::error::AdaptiveError;

/// Exit code and printable lines for a fatal error
///
/// - For `AdaptiveError`: the user message, plus the developer message with
///   the full source chain in verbose mode
/// - For other errors: the error and, in verbose mode, its chain
pub fn describe_fatal_error(error: &anyhow::Error, verbose: u8) -> (i32, Vec<String>) {
    let mut lines = Vec::new();

    let exit_code = if let Some(err) = error.downcast_ref::<AdaptiveError>() {
        lines.push(err.user_message());
        if verbose >= 1 {
            lines.push(format!("\nContext Chain:\n{}", err.developer_message()));
        }
        err.exit_code()
    } else {
        lines.push(format!("Error: {error}"));
        if verbose >= 1 {
            lines.push("\nError chain:".to_string());
            for (i, cause) in error.chain().enumerate() {
                lines.push(format!("  {}: {}", i, cause));
            }
        }
        1
    };

    (exit_code, lines)
}

/// Handle fatal errors and exit with appropriate status code
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);

    let (exit_code, lines) = describe_fatal_error(&error, verbose);
    for line in lines {
        eprintln!("{line}");
    }
    std::process::exit(exit_code)
}
