//! Error types for the watchdog subsystem.
//!
//! Usage errors (`InvalidState`, `AlreadyAttached`, `NotAttached`) and
//! resource limits are returned synchronously. Expiry and recovery are not
//! errors; they are reported through the event log and the client callback.

use thiserror::Error;

use hangwatch_eventlog::EventLogError;
use hangwatch_report::ReportError;
use hangwatch_timer::TimerError;

/// Broad classification of a [`WatchdogError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A configured limit was reached.
    ResourceExhausted,
    /// The operation is not valid in the object's current state.
    InvalidState,
    /// A context blob is already attached.
    AlreadyAttached,
    /// No context blob is attached.
    NotAttached,
    /// Configuration was rejected.
    Configuration,
    /// Diagnostic capture failed.
    Capture,
}

/// Errors that can occur during watchdog operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchdogError {
    /// The operation is not valid in the current state, or the object was released.
    #[error("Invalid state for {operation}: watchdog is {state}")]
    InvalidState {
        /// Operation that was rejected.
        operation: &'static str,
        /// State the object was found in.
        state: String,
    },

    /// A configured limit was reached.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A context blob is already attached.
    #[error("Context already attached ({size} bytes)")]
    AlreadyAttached {
        /// Size of the attached blob.
        size: usize,
    },

    /// No context blob is attached.
    #[error("No context attached")]
    NotAttached,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Timer dispatcher failure.
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Debug report failure.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Event log failure.
    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),
}

impl WatchdogError {
    /// Create an invalid state error.
    #[must_use]
    pub fn invalid_state(operation: &'static str, state: impl core::fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Create a resource exhausted error.
    #[must_use]
    pub fn resource_exhausted(reason: impl Into<String>) -> Self {
        Self::ResourceExhausted(reason.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::AlreadyAttached { .. } => ErrorKind::AlreadyAttached,
            Self::NotAttached => ErrorKind::NotAttached,
            Self::InvalidConfiguration(_) => ErrorKind::Configuration,
            Self::Timer(TimerError::ShutDown) => ErrorKind::InvalidState,
            Self::Timer(TimerError::SpawnFailed(_)) => ErrorKind::ResourceExhausted,
            Self::Timer(TimerError::InvalidConfig(_)) => ErrorKind::Configuration,
            Self::Report(ReportError::Configuration(_)) => ErrorKind::Configuration,
            Self::Report(ReportError::InvalidState { .. }) => ErrorKind::InvalidState,
            Self::Report(_) => ErrorKind::Capture,
            Self::EventLog(EventLogError::InvalidConfiguration(_)) => ErrorKind::Configuration,
            Self::EventLog(EventLogError::InvalidLevel(_)) => ErrorKind::InvalidState,
        }
    }
}

/// A specialized `Result` type for watchdog operations.
pub type WatchdogResult<T> = std::result::Result<T, WatchdogError>;

#[cfg(test)]
mod tests {
    use super::*;
    use hangwatch_eventlog::LogLevel;

    #[test]
    fn test_error_display() {
        let err = WatchdogError::invalid_state("suspend", "idle");
        assert_eq!(err.to_string(), "Invalid state for suspend: watchdog is idle");

        let err = WatchdogError::AlreadyAttached { size: 16 };
        assert!(err.to_string().contains("16 bytes"));
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            WatchdogError::resource_exhausted("limit").kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(WatchdogError::NotAttached.kind(), ErrorKind::NotAttached);
        assert_eq!(
            WatchdogError::from(TimerError::ShutDown).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            WatchdogError::from(ReportError::Io("disk full".into())).kind(),
            ErrorKind::Capture
        );
        assert_eq!(
            WatchdogError::from(EventLogError::InvalidLevel(LogLevel::All)).kind(),
            ErrorKind::InvalidState
        );
    }
}
