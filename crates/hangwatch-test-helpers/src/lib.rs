//! Shared test utilities for hangwatch.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`probe`] - Thread-safe recorder for watchdog and timer callbacks
//! - [`wait`] - Polling helpers for asynchronous timer behaviour
//! - [`prelude`] - Convenience re-exports
//!
//! ```rust,ignore
//! use hangwatch_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic)]

pub mod must;
pub mod prelude;
pub mod probe;
pub mod wait;

pub use must::*;
pub use probe::CallbackProbe;
pub use wait::{init_test_tracing, wait_until};
