//! Log levels for watchdog event entries.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Severity of an event log entry.
///
/// Lower discriminants are more severe. A query for a level returns entries
/// at that level and every more severe one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogLevel {
    /// Unrecoverable failure. Parameters carry a bug-check code and its arguments.
    CriticalError = 0,
    /// Violated internal assertion or client usage error.
    Assertion = 1,
    /// Recoverable error, e.g. an expired deadline.
    Error = 2,
    /// Warning, e.g. a progress watchdog trigger.
    Warning = 3,
    /// Informational event.
    Event = 4,
    /// Verbose trace.
    Trace = 5,
    /// Resource shortage notice.
    LowResource = 6,
    /// Display-manager event.
    DmmEvent = 7,
    /// Sentinel covering every level. Queries with it return nothing.
    All = 8,
}

impl LogLevel {
    /// The first (most severe) level.
    pub const FIRST: Self = Self::CriticalError;

    /// Every concrete level, most severe first.
    pub const CONCRETE: [Self; 8] = [
        Self::CriticalError,
        Self::Assertion,
        Self::Error,
        Self::Warning,
        Self::Event,
        Self::Trace,
        Self::LowResource,
        Self::DmmEvent,
    ];

    /// Convert from the raw discriminant.
    #[must_use]
    pub const fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::CriticalError),
            1 => Some(Self::Assertion),
            2 => Some(Self::Error),
            3 => Some(Self::Warning),
            4 => Some(Self::Event),
            5 => Some(Self::Trace),
            6 => Some(Self::LowResource),
            7 => Some(Self::DmmEvent),
            8 => Some(Self::All),
            _ => None,
        }
    }

    /// Raw discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        self as u8
    }

    /// Whether an entry logged at `entry` is selected by a query at `self`.
    ///
    /// The `All` sentinel selects nothing.
    #[must_use]
    pub const fn selects(self, entry: LogLevel) -> bool {
        !matches!(self, Self::All) && (entry as u8) <= (self as u8)
    }

    /// Whether entries at this level are errors for debug-break purposes.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::CriticalError | Self::Error)
    }

    /// Level name as used in log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CriticalError => "WdCriticalError",
            Self::Assertion => "WdAssertion",
            Self::Error => "WdError",
            Self::Warning => "WdWarning",
            Self::Event => "WdEvent",
            Self::Trace => "WdTrace",
            Self::LowResource => "WdLowResource",
            Self::DmmEvent => "WdDmmEvent",
            Self::All => "WdLogLevelAll",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip() {
        for level in LogLevel::CONCRETE {
            assert_eq!(LogLevel::from_raw(level.to_raw()), Some(level));
        }
        assert_eq!(LogLevel::from_raw(8), Some(LogLevel::All));
        assert_eq!(LogLevel::from_raw(9), None);
    }

    #[test]
    fn test_selects_more_severe_levels() {
        assert!(LogLevel::Warning.selects(LogLevel::CriticalError));
        assert!(LogLevel::Warning.selects(LogLevel::Warning));
        assert!(!LogLevel::Warning.selects(LogLevel::Event));
        assert!(LogLevel::CriticalError.selects(LogLevel::CriticalError));
        assert!(!LogLevel::CriticalError.selects(LogLevel::Assertion));
    }

    #[test]
    fn test_all_selects_nothing() {
        for level in LogLevel::CONCRETE {
            assert!(!LogLevel::All.selects(level));
        }
    }
}
