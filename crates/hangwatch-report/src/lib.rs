//! Debug report capture pipeline for hangwatch watchdogs
//!
//! When a watchdog expires it asks the [`DebugReportPipeline`] for a
//! [`DebugReport`]: a failure code with four arguments, a per-device report
//! counter, driver names, an error-report context and an optional dump blob
//! holding the most recent event log entries.
//!
//! # Report lifecycle
//!
//! 1. [`DebugReportPipeline::create`] (or [`DebugReportPipeline::recreate`],
//!    which reuses a still-pending report's identity)
//! 2. optional [`DebugReportPipeline::attach_secondary_data`] and
//!    [`DebugReportPipeline::attach_dump`]
//! 3. exactly one of [`DebugReportPipeline::complete`], which hands the
//!    report to a [`ReportSink`], or [`DebugReportPipeline::cancel`]
//!
//! Wrap a slow sink in a [`QueuedSink`] to deliver on a worker thread
//! instead of the completing thread.
//!
//! # Dump format
//!
//! Dumps are bincode-encoded [`DumpContents`] with a magic number and a
//! version; see [`format`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hangwatch_eventlog::EventLog;
//! use hangwatch_report::prelude::*;
//!
//! # fn main() -> ReportResult<()> {
//! let sink = Arc::new(MemorySink::new());
//! let pipeline = DebugReportPipeline::new(
//!     ReportConfig::default(),
//!     Arc::new(EventLog::default()),
//!     sink.clone(),
//! )?;
//!
//! let (report, attached) = pipeline.capture(DeviceId::new(1), 0x1a0, [0; 4], None);
//! attached?;
//! pipeline.complete(&report)?;
//! assert_eq!(sink.len(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod prelude;
pub mod queued;
pub mod report;
pub mod sink;
pub mod snapshot;

pub use config::{ReportConfig, ReportConfigBuilder};
pub use device::DeviceId;
pub use error::{ReportError, ReportResult};
pub use format::{DumpContents, DumpHeader, SecondaryBlock, decode_dump, encode_dump};
pub use pipeline::{DebugReportPipeline, PipelineStats};
pub use queued::{DEFAULT_SINK_THREAD_NAME, QueueStats, QueuedSink};
pub use report::{DebugReport, ErrorReportContext, ReportInfo, ReportState};
pub use sink::{DirectorySink, MemorySink, ReportMetadata, ReportSink, SubmittedReport};
pub use snapshot::Snapshot;
