//! Convenience re-exports for common test utilities.

pub use crate::must::{must, must_some, must_with};
pub use crate::probe::CallbackProbe;
pub use crate::wait::{init_test_tracing, wait_until};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
