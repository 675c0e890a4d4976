//! Error types for the timer crate.

use std::fmt;

/// Timer dispatcher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// The dispatcher was shut down or dropped
    #[error("Timer dispatcher is shut down")]
    ShutDown,

    /// The dispatcher thread could not be started
    #[error("Failed to spawn timer dispatcher thread: {0}")]
    SpawnFailed(String),

    /// Invalid dispatcher configuration
    #[error("Invalid timer configuration: {0}")]
    InvalidConfig(String),
}

impl TimerError {
    /// Create a spawn error with context
    #[must_use]
    pub fn spawn_failed(context: impl fmt::Display) -> Self {
        TimerError::SpawnFailed(context.to_string())
    }
}

/// Result type for timer operations
pub type TimerResult<T = ()> = Result<T, TimerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_failed_keeps_context() {
        let e = TimerError::spawn_failed("resource temporarily unavailable");
        assert!(matches!(e, TimerError::SpawnFailed(_)));
        assert!(e.to_string().contains("temporarily"));
    }
}
