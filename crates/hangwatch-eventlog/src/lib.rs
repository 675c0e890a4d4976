//! Strictly ordered structured event log for hangwatch watchdogs
//!
//! Every entry carries a process-wide event order, a [`LogLevel`], the
//! creating thread, its call site and five opaque `u64` parameters. Orders
//! are assigned when an entry is created and never reused, so entries from
//! concurrent writers can always be put back into creation order.
//!
//! # Entry lifecycle
//!
//! 1. [`EventLog::new_entry`] (or a per-level constructor such as
//!    [`EventLog::new_error`]) assigns the order and records the call site.
//! 2. The caller fills parameters on the returned [`PendingEntry`].
//! 3. [`EventLog::commit`] inserts the entry into the ring, mirrors it into
//!    `tracing` and, when configured, breaks into an attached debugger.
//!
//! # Queries
//!
//! [`EventLog::recent`] returns entries at or above a level, most recent
//! first. [`EventLog::copy_recent`] writes the same entries as fixed 64-byte
//! records that [`LogRecord::from_bytes`] decodes.
//!
//! # Example
//!
//! ```rust
//! use hangwatch_eventlog::{EventLog, EventLogConfig, LogLevel};
//!
//! let log = EventLog::new(EventLogConfig::default())?;
//! let entry = log.commit(log.new_warning().with_parameters(&[0x57, 1]));
//!
//! let recent = log.recent(LogLevel::Error, 10);
//! assert!(recent.is_empty());
//! let recent = log.recent(LogLevel::Warning, 10);
//! assert_eq!(recent.first().map(|e| e.event_order()), Some(entry.event_order()));
//! # Ok::<(), hangwatch_eventlog::EventLogError>(())
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod debugger;
pub mod entry;
pub mod error;
pub mod level;
pub mod log;
pub mod macros;
pub mod prelude;

pub use debugger::{DebugFlag, DebugFlags, DebuggerHook, DebuggerProbe, NoDebugger};
pub use entry::{
    CallSite, LogEntry, LogRecord, MAX_PARAMETERS, PendingEntry, RECORD_SIZE, ThreadTag,
};
pub use error::{EventLogError, EventLogResult};
pub use level::LogLevel;
pub use log::{EventLog, EventLogConfig, EventLogStats, MAX_CAPACITY, current_event_order};
