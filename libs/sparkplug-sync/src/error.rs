//! Error types for the synchronization engine
//!
//! Every variant describes a failure local to one unit of work (a field, a
//! metric, a message). Callers log and skip; nothing here aborts a batch.

use thiserror::Error;

/// Errors raised while decoding, validating or routing metrics
#[derive(Error, Debug)]
pub enum SyncError {
    /// Declared type cannot be represented by the value model
    #[error("Unsupported data type: {0}")]
    UnsupportedType(String),

    /// Update targets an existing metric with an incompatible type
    #[error("Type mismatch for metric '{metric}': expected {expected}, got {actual}")]
    TypeMismatch {
        metric: String,
        expected: String,
        actual: String,
    },

    /// Inbound data or command names a metric the device does not have
    #[error("Unknown metric '{metric}' on device '{device}'")]
    UnknownMetric { device: String, metric: String },

    /// Required key missing or mistyped in an inbound record
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Composite instance refers to a definition that was never registered
    #[error("Unknown UDT definition: {name} (version {version})")]
    UnknownDefinition { name: String, version: String },

    /// Topic does not match any known inbound or outbound format
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] gateway_common::Error),
}

/// Result type for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        SyncError::MalformedRecord(msg.into())
    }

    pub fn unknown_metric(device: impl Into<String>, metric: impl Into<String>) -> Self {
        SyncError::UnknownMetric {
            device: device.into(),
            metric: metric.into(),
        }
    }

    pub fn type_mismatch(
        metric: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        SyncError::TypeMismatch {
            metric: metric.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::MalformedRecord(err.to_string())
    }
}
