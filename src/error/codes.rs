/// Error code registry for adaptive-splits
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Stability evaluation errors
/// - 3000-3999: Job registry storage errors
/// - 4000-4999: Batch execution errors
/// - 9000-9999: Other errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_YAML: u16 = 1002;
    pub const CONFIG_INVALID_JSON: u16 = 1003;
    pub const CONFIG_MISSING_REQUIRED: u16 = 1004;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;
    pub const CONFIG_INVALID_TOML: u16 = 1006;
    pub const CONFIG_UNKNOWN_STRATEGY: u16 = 1010;
    pub const CONFIG_UNIT_CARDINALITY: u16 = 1011;
    pub const CONFIG_SEED_OVERFLOW: u16 = 1012;
    pub const CONFIG_METRIC_PATH: u16 = 1013;
    pub const CONFIG_TEMPLATE: u16 = 1014;
    pub const CONFIG_EXECUTION_MISMATCH: u16 = 1015;

    // Stability evaluation errors (2000-2999)
    pub const STABILITY_INSUFFICIENT_DATA: u16 = 2001;
    pub const STABILITY_INVALID_CUSTOM_RESULT: u16 = 2101;

    // Storage errors (3000-3999)
    pub const STORAGE_GENERIC: u16 = 3000;
    pub const STORAGE_IO_ERROR: u16 = 3001;
    pub const STORAGE_PERMISSION_DENIED: u16 = 3002;
    pub const STORAGE_NOT_FOUND: u16 = 3004;
    pub const STORAGE_SERIALIZATION_ERROR: u16 = 3011;

    // Batch execution errors (4000-4999)
    pub const BATCH_GENERIC: u16 = 4000;
    pub const BATCH_UNIT_FAILED: u16 = 4001;
    pub const BATCH_TIMEOUT: u16 = 4002;
    pub const BATCH_SUBMISSION_FAILED: u16 = 4003;
    pub const BATCH_MISSING_RESULT: u16 = 4004;
    pub const BATCH_WORKER_PANICKED: u16 = 4005;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::CONFIG_GENERIC => "Generic configuration error",
        ErrorCode::CONFIG_NOT_FOUND => "Run configuration file not found",
        ErrorCode::CONFIG_INVALID_YAML => "Invalid YAML syntax in configuration",
        ErrorCode::CONFIG_INVALID_JSON => "Invalid JSON syntax",
        ErrorCode::CONFIG_MISSING_REQUIRED => "Required configuration field missing",
        ErrorCode::CONFIG_INVALID_VALUE => "Invalid configuration value",
        ErrorCode::CONFIG_INVALID_TOML => "Invalid TOML syntax in configuration",
        ErrorCode::CONFIG_UNKNOWN_STRATEGY => "Unknown stability strategy",
        ErrorCode::CONFIG_UNIT_CARDINALITY => "Evaluator yields more than one unit per split",
        ErrorCode::CONFIG_SEED_OVERFLOW => "Seed range exceeds the integer range",
        ErrorCode::CONFIG_METRIC_PATH => "Metric not found in unit result",
        ErrorCode::CONFIG_TEMPLATE => "Job template could not be rendered",
        ErrorCode::CONFIG_EXECUTION_MISMATCH => "Dispatcher does not match execution type",
        ErrorCode::STABILITY_INSUFFICIENT_DATA => "Metric history shorter than window + 1",
        ErrorCode::STABILITY_INVALID_CUSTOM_RESULT => "Custom statistic returned a non-scalar",
        ErrorCode::STORAGE_GENERIC => "Generic job registry error",
        ErrorCode::STORAGE_IO_ERROR => "Job registry I/O failed",
        ErrorCode::STORAGE_PERMISSION_DENIED => "Job registry is not writable",
        ErrorCode::STORAGE_NOT_FOUND => "Job registry entry not found",
        ErrorCode::STORAGE_SERIALIZATION_ERROR => "Job registry entry could not be serialized",
        ErrorCode::BATCH_GENERIC => "Generic batch execution error",
        ErrorCode::BATCH_UNIT_FAILED => "A unit in the batch failed",
        ErrorCode::BATCH_TIMEOUT => "Batch did not complete within its timeout",
        ErrorCode::BATCH_SUBMISSION_FAILED => "Job submission to the scheduler failed",
        ErrorCode::BATCH_MISSING_RESULT => "A submitted job produced no result",
        ErrorCode::BATCH_WORKER_PANICKED => "A worker task panicked",
        _ => "Unknown error",
    }
}
