//! Prelude module for convenient imports.

pub use crate::{
    DispatchMetrics, DispatcherConfig, TimerAction, TimerDispatcher, TimerError, TimerHandle,
    TimerResult,
};
