use crate::error::{AdaptiveError, ErrorCode};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

/// Process failures surface as batch execution errors
impl From<ProcessError> for AdaptiveError {
    fn from(err: ProcessError) -> Self {
        let code = match &err {
            ProcessError::Timeout(_) => ErrorCode::BATCH_TIMEOUT,
            ProcessError::CommandNotFound(_) | ProcessError::SpawnFailed { .. } => {
                ErrorCode::BATCH_SUBMISSION_FAILED
            }
            ProcessError::Io(_) | ProcessError::MockExpectationNotMet(_) => {
                ErrorCode::BATCH_GENERIC
            }
        };
        AdaptiveError::batch_with_code(code, err.to_string()).with_source(err)
    }
}
