//! Prelude for hangwatch-eventlog
//!
//! ```rust
//! use hangwatch_eventlog::prelude::*;
//! ```

pub use crate::{
    DebugFlag, DebugFlags, DebuggerHook, DebuggerProbe, EventLog, EventLogConfig, EventLogError,
    EventLogResult, LogEntry, LogLevel, LogRecord, NoDebugger, PendingEntry, ThreadTag, wd_log,
};
