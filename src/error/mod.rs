use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// The unified error type for the controller
#[derive(Error, Debug)]
pub enum AdaptiveError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Configuration {
        code: u16,
        message: String,
        field: Option<String>,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Insufficient data: {message}")]
    InsufficientData {
        code: u16,
        message: String,
        required: usize,
        available: usize,
    },

    #[error("[E{code:04}] Invalid custom stability result: {message}")]
    InvalidCustomResult {
        code: u16,
        message: String,
        strategy: String,
    },

    #[error("[E{code:04}] Storage error: {message}")]
    Storage {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Batch execution failed: {message}")]
    BatchExecution {
        code: u16,
        message: String,
        unit_id: Option<String>,
        iteration: Option<u64>,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl AdaptiveError {
    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Configuration {
            code,
            message: message.into(),
            field: None,
            source: None,
        }
    }

    /// Create a configuration error for a required field that is absent
    pub fn missing_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::Configuration {
            code: ErrorCode::CONFIG_MISSING_REQUIRED,
            message: format!("missing required field '{field}'"),
            field: Some(field),
            source: None,
        }
    }

    /// Create a configuration error for a field holding an unusable value
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            code: ErrorCode::CONFIG_INVALID_VALUE,
            message: message.into(),
            field: Some(field.into()),
            source: None,
        }
    }

    pub fn unknown_strategy(id: impl Display) -> Self {
        Self::config_with_code(
            ErrorCode::CONFIG_UNKNOWN_STRATEGY,
            format!("unknown stability strategy '{id}'"),
        )
    }

    pub fn insufficient_data(required: usize, available: usize) -> Self {
        Self::InsufficientData {
            code: ErrorCode::STABILITY_INSUFFICIENT_DATA,
            message: format!(
                "stability check needs at least {required} values, history has {available}"
            ),
            required,
            available,
        }
    }

    pub fn invalid_custom_result(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCustomResult {
            code: ErrorCode::STABILITY_INVALID_CUSTOM_RESULT,
            message: message.into(),
            strategy: strategy.into(),
        }
    }

    /// Create a storage error with default code
    pub fn storage(message: impl Into<String>) -> Self {
        Self::storage_with_code(ErrorCode::STORAGE_GENERIC, message, None)
    }

    /// Create a storage error with specific code and path
    pub fn storage_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Create a batch execution error with default code
    pub fn batch(message: impl Into<String>) -> Self {
        Self::batch_with_code(ErrorCode::BATCH_GENERIC, message)
    }

    /// Create a batch execution error with specific code
    pub fn batch_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::BatchExecution {
            code,
            message: message.into(),
            unit_id: None,
            iteration: None,
            source: None,
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(mut self, source: impl Into<BoxedSource>) -> Self {
        match &mut self {
            Self::Configuration { source: src, .. }
            | Self::Storage { source: src, .. }
            | Self::BatchExecution { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
            Self::InsufficientData { .. } | Self::InvalidCustomResult { .. } => {}
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Configuration { message, .. }
            | Self::InsufficientData { message, .. }
            | Self::InvalidCustomResult { message, .. }
            | Self::Storage { message, .. }
            | Self::BatchExecution { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Attach the failing unit to a batch execution error
    pub fn with_unit(mut self, unit: impl Display) -> Self {
        if let Self::BatchExecution {
            unit_id: ref mut u, ..
        } = self
        {
            *u = Some(unit.to_string());
        }
        self
    }

    /// Attach the controller iteration to a batch execution error
    pub fn with_iteration(mut self, iteration: u64) -> Self {
        if let Self::BatchExecution {
            iteration: ref mut i,
            ..
        } = self
        {
            *i = Some(iteration);
        }
        self
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => 2,
            Self::InsufficientData { .. } => 3,
            Self::InvalidCustomResult { .. } => 3,
            Self::Storage { .. } => 4,
            Self::BatchExecution { .. } => 5,
            Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Configuration { code, .. }
            | Self::InsufficientData { code, .. }
            | Self::InvalidCustomResult { code, .. }
            | Self::Storage { code, .. }
            | Self::BatchExecution { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_batch_execution(&self) -> bool {
        matches!(self, Self::BatchExecution { .. })
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration { message, field, .. } => match field {
                Some(f) => format!("Configuration problem in '{}': {}", f, message),
                None => format!("Configuration problem: {}", message),
            },
            Self::InsufficientData { message, .. } => format!("Not enough data: {}", message),
            Self::InvalidCustomResult {
                message, strategy, ..
            } => format!("Custom strategy '{}' misbehaved: {}", strategy, message),
            Self::Storage { message, path, .. } => match path {
                Some(p) => format!("Job registry error at {}: {}", p.display(), message),
                None => format!("Job registry error: {}", message),
            },
            Self::BatchExecution {
                message,
                unit_id,
                iteration,
                ..
            } => {
                let mut msg = String::from("Batch failed");
                if let Some(i) = iteration {
                    msg.push_str(&format!(" in iteration {}", i));
                }
                if let Some(u) = unit_id {
                    msg.push_str(&format!(" at unit '{}'", u));
                }
                format!("{}: {}", msg, message)
            }
            Self::Other { message, .. } => message.clone(),
        }
    }

    /// Get a developer-friendly error message with full chain
    pub fn developer_message(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(&format!("\n  caused by: {}", cause));
            source = cause.source();
        }
        out
    }
}

/// Type alias for Results using AdaptiveError
pub type Result<T> = std::result::Result<T, AdaptiveError>;

impl From<std::io::Error> for AdaptiveError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, message) = match err.kind() {
            ErrorKind::NotFound => (ErrorCode::STORAGE_NOT_FOUND, "File or directory not found"),
            ErrorKind::PermissionDenied => {
                (ErrorCode::STORAGE_PERMISSION_DENIED, "Permission denied")
            }
            _ => (ErrorCode::STORAGE_IO_ERROR, "IO operation failed"),
        };

        AdaptiveError::storage_with_code(code, message, None).with_source(err)
    }
}

impl From<serde_yaml::Error> for AdaptiveError {
    fn from(err: serde_yaml::Error) -> Self {
        AdaptiveError::config_with_code(ErrorCode::CONFIG_INVALID_YAML, "Invalid YAML syntax")
            .with_source(err)
    }
}

impl From<serde_json::Error> for AdaptiveError {
    fn from(err: serde_json::Error) -> Self {
        AdaptiveError::config_with_code(ErrorCode::CONFIG_INVALID_JSON, "Invalid JSON syntax")
            .with_source(err)
    }
}

impl From<toml::de::Error> for AdaptiveError {
    fn from(err: toml::de::Error) -> Self {
        AdaptiveError::config_with_code(ErrorCode::CONFIG_INVALID_TOML, "Invalid TOML syntax")
            .with_source(err)
    }
}

impl From<tera::Error> for AdaptiveError {
    fn from(err: tera::Error) -> Self {
        AdaptiveError::config_with_code(ErrorCode::CONFIG_TEMPLATE, "Job template failed to render")
            .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation_and_chaining() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "results dir");
        let err = AdaptiveError::storage("Cannot read job result")
            .with_source(io_err)
            .with_context("while collecting batch");

        assert_eq!(err.code(), ErrorCode::STORAGE_GENERIC);
        assert!(err.to_string().contains("[E3000]"));
        assert!(err.user_message().contains("Cannot read job result"));
        assert!(err.developer_message().contains("caused by: results dir"));
    }

    #[test]
    fn test_batch_error_carries_unit_and_iteration() {
        let err = AdaptiveError::batch_with_code(ErrorCode::BATCH_UNIT_FAILED, "exit code 1")
            .with_unit("split_3")
            .with_iteration(2);

        assert!(err.is_batch_execution());
        assert_eq!(err.exit_code(), 5);
        assert_eq!(
            err.user_message(),
            "Batch failed in iteration 2 at unit 'split_3': exit code 1"
        );
    }

    #[test]
    fn test_missing_field_names_the_field() {
        let err = AdaptiveError::missing_field("stability.threshold.value");
        assert_eq!(err.code(), ErrorCode::CONFIG_MISSING_REQUIRED);
        assert!(err.user_message().contains("stability.threshold.value"));
        assert_eq!(err.exit_code(), 2);
    }
}
