//! Prelude for hangwatch-watchdog.
//!
//! This module re-exports the most commonly used types for convenient importing.

pub use crate::clock::{ExecutionClock, TimeBasis};
pub use crate::config::{DeadlineSeverity, ProgressSeverity, SubsystemConfig};
pub use crate::deadline::{DeadlineState, DeadlineWatchdog};
pub use crate::error::{ErrorKind, WatchdogError, WatchdogResult};
pub use crate::object::{WatchdogEvent, WatchdogKind};
pub use crate::progress::{ProgressState, ProgressWatchdog};
pub use crate::subsystem::Subsystem;
pub use crate::watchdog::Watchdog;
