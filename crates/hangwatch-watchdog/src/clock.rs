//! Per-thread execution time sources.
//!
//! The deadline watchdog samples the consumed execution time of the thread
//! that started it. If that time did not advance over a whole deadline the
//! thread was starved rather than hung, and the deadline is extended by one
//! increment instead of firing.

use std::time::{Duration, Instant};

use hangwatch_eventlog::ThreadTag;
use serde::{Deserialize, Serialize};

/// Which part of a thread's execution time a watchdog samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum TimeBasis {
    /// Time spent in privileged code.
    Kernel = 1,
    /// Time spent in unprivileged code.
    User = 2,
    /// Kernel and user time combined.
    #[default]
    Full = 3,
}

impl TimeBasis {
    /// Convert from the raw value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Kernel),
            2 => Some(Self::User),
            3 => Some(Self::Full),
            _ => None,
        }
    }

    /// Raw value.
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }
}

/// Source of consumed execution time per thread.
pub trait ExecutionClock: Send + Sync {
    /// Cumulative execution time of `thread` in `basis`.
    ///
    /// `None` means the time is unknown, which disables the starvation check.
    fn thread_time(&self, thread: ThreadTag, basis: TimeBasis) -> Option<Duration>;
}

/// Clock that reports elapsed wall time for every thread.
///
/// Time always advances, so a watched thread is never considered starved.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    /// Create a clock starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionClock for WallClock {
    fn thread_time(&self, _thread: ThreadTag, _basis: TimeBasis) -> Option<Duration> {
        Some(self.origin.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_basis_raw_values() {
        assert_eq!(TimeBasis::Kernel.to_raw(), 1);
        assert_eq!(TimeBasis::User.to_raw(), 2);
        assert_eq!(TimeBasis::Full.to_raw(), 3);
        assert_eq!(TimeBasis::from_raw(2), Some(TimeBasis::User));
        assert_eq!(TimeBasis::from_raw(0), None);
    }

    #[test]
    fn test_wall_clock_advances() {
        let clock = WallClock::new();
        let thread = ThreadTag::current();
        let first = clock.thread_time(thread, TimeBasis::Full);
        std::thread::sleep(Duration::from_millis(2));
        let second = clock.thread_time(thread, TimeBasis::Kernel);
        assert!(second > first);
    }
}
