//! # hangwatch-watchdog
//!
//! Hang detection and recovery for units of work that must finish in
//! bounded time.
//!
//! A client allocates a watchdog from a [`Subsystem`], starts it, and is
//! called back on the timer dispatcher thread when the work does not
//! finish. Before the callback runs the failure is written to the shared
//! [`hangwatch_eventlog::EventLog`] and a debug report is captured through
//! the [`hangwatch_report::DebugReportPipeline`].
//!
//! ## Detection strategies
//!
//! - [`DeadlineWatchdog`] fires once a due time elapses without completion.
//!   Starts and suspends nest, and time spent suspended does not count.
//! - [`ProgressWatchdog`] fires when no monitored section was entered or
//!   left for `miss_threshold` consecutive periods, so long-running work
//!   that keeps making progress is tolerated.
//!
//! ## Lifecycle
//!
//! Every object carries a logical reference count starting at 1. The last
//! [`DeadlineWatchdog::dereference`] releases the object: its timer is
//! canceled, the attached context dropped and any pending report canceled.
//! Operations on a released object fail with [`WatchdogError::InvalidState`]
//! and are logged as assertions.
//!
//! ## Concurrency
//!
//! Section entry and exit are lock-free. The per-object lock is never held
//! while waiting for the dispatcher or running client code. A timer callback
//! takes a logical reference for its duration and re-checks the current arm
//! cycle under the lock, so a stale firing does nothing.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hangwatch_report::{DeviceId, MemorySink};
//! use hangwatch_watchdog::prelude::*;
//!
//! let subsystem = Subsystem::builder(SubsystemConfig::default())
//!     .sink(Arc::new(MemorySink::new()))
//!     .build()?;
//!
//! let watchdog = subsystem.allocate_progress(DeviceId::new(1), TimeBasis::Full, 7, false)?;
//! watchdog.start(Duration::from_secs(1), |w| {
//!     tracing::warn!(owner_tag = w.owner_tag(), "worker stalled");
//! })?;
//! watchdog.monitored(|| { /* one unit of work */ })?;
//! assert!(watchdog.free()?);
//! # Ok::<(), WatchdogError>(())
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod clock;
pub mod config;
pub mod deadline;
pub mod device;
pub mod error;
pub mod object;
pub mod progress;
pub mod subsystem;
pub mod watchdog;

pub mod prelude;

pub use clock::{ExecutionClock, TimeBasis, WallClock};
pub use config::{DeadlineSeverity, ProgressSeverity, SubsystemConfig, SubsystemConfigBuilder};
pub use deadline::{
    DEADLINE_EXPIRED_CODE, DeadlineCallback, DeadlineState, DeadlineStatus, DeadlineWatchdog,
};
pub use device::DeviceRegistry;
pub use error::{ErrorKind, WatchdogError, WatchdogResult};
pub use object::{WatchdogEvent, WatchdogKind};
pub use progress::{
    PROGRESS_STALLED_CODE, ProgressCallback, ProgressState, ProgressStatus, ProgressWatchdog,
};
pub use subsystem::{Subsystem, SubsystemBuilder};
pub use watchdog::Watchdog;
