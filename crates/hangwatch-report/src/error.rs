//! Debug report error types

use thiserror::Error;

use crate::report::ReportState;

/// Debug report pipeline error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// Report is no longer pending
    #[error("Report {report_id} is already {state}")]
    InvalidState {
        /// Report identifier
        report_id: String,
        /// State the report was found in
        state: ReportState,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Size limit exceeded
    #[error("Size limit exceeded: {0}")]
    SizeLimit(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Invalid dump magic number
    #[error("Invalid dump magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        /// Expected magic bytes
        expected: [u8; 4],
        /// Actual magic bytes
        actual: [u8; 4],
    },

    /// Unsupported dump version
    #[error("Unsupported dump version: {0}")]
    UnsupportedVersion(u32),

    /// Sink rejected the report
    #[error("Report sink failed: {0}")]
    Sink(String),
}

impl ReportError {
    /// Create a size limit error with context
    #[must_use]
    pub fn size_limit(what: &str, size: usize, limit: usize) -> Self {
        ReportError::SizeLimit(format!("{what} is {size} bytes, limit is {limit}"))
    }
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::Io(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for ReportError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ReportError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for ReportError {
    fn from(err: bincode::error::DecodeError) -> Self {
        ReportError::Deserialization(err.to_string())
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::Serialization(err.to_string())
    }
}

/// Result type for debug report operations
pub type ReportResult<T> = Result<T, ReportError>;
