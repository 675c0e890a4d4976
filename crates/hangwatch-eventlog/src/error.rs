//! Event log error types

use core::fmt;

use crate::level::LogLevel;

/// Event log errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventLogError {
    /// Level cannot be used to create an entry
    #[error("Log level {0} cannot be used for an entry")]
    InvalidLevel(LogLevel),

    /// Invalid configuration
    #[error("Invalid event log configuration: {0}")]
    InvalidConfiguration(String),
}

impl EventLogError {
    /// Create a configuration error with context
    #[must_use]
    pub fn invalid_configuration(context: impl fmt::Display) -> Self {
        EventLogError::InvalidConfiguration(context.to_string())
    }
}

/// Result alias for event log operations
pub type EventLogResult<T> = Result<T, EventLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = EventLogError::InvalidLevel(LogLevel::All);
        assert!(e.to_string().contains("WdLogLevelAll"));

        let e = EventLogError::invalid_configuration("capacity must be non-zero");
        assert!(matches!(e, EventLogError::InvalidConfiguration(_)));
        assert!(e.to_string().contains("non-zero"));
    }
}
