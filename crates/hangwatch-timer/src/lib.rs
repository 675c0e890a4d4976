//! One-shot timers driven by a dedicated dispatcher thread.
//!
//! Watchdogs arm timers here and get called back on the dispatcher thread
//! when a due time passes. Callbacks decide whether their timer is re-armed
//! by returning a [`TimerAction`], so a periodic timer never has more than
//! one callback in flight.
//!
//! # Cancellation
//!
//! - [`TimerHandle::cancel`] disarms without blocking. A callback that has
//!   already started still runs to completion, but its re-arm is ignored.
//! - [`TimerHandle::cancel_sync`] also waits for an in-flight callback,
//!   except on the dispatcher thread itself.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use hangwatch_timer::{TimerAction, TimerDispatcher};
//!
//! let dispatcher = TimerDispatcher::new()?;
//! let mut ticks = 0;
//! let timer = dispatcher.create_timer(move || {
//!     ticks += 1;
//!     if ticks < 3 {
//!         TimerAction::Rearm(Duration::from_millis(1))
//!     } else {
//!         TimerAction::Stop
//!     }
//! })?;
//! timer.schedule(Duration::from_millis(1))?;
//! timer.cancel_sync();
//! # Ok::<(), hangwatch_timer::TimerError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(unused_must_use)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod prelude;

pub use dispatcher::{
    DispatcherConfig, TimerAction, TimerCallback, TimerDispatcher, TimerHandle, TimerId,
};
pub use error::{TimerError, TimerResult};
pub use metrics::DispatchMetrics;
