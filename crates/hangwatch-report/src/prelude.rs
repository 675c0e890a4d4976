//! Prelude module for convenient imports
//!
//! ```rust
//! use hangwatch_report::prelude::*;
//! ```

pub use crate::{
    DebugReport, DebugReportPipeline, DeviceId, DirectorySink, MemorySink, QueuedSink,
    ReportConfig, ReportError, ReportInfo, ReportResult, ReportSink, ReportState, Snapshot,
};
