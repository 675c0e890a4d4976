//! Report sinks.
//!
//! A completed report is frozen into a [`SubmittedReport`] and handed to the
//! pipeline's [`ReportSink`]. [`MemorySink`] keeps submissions for
//! inspection; [`DirectorySink`] files them on disk as
//! `<base>/<report id>/<file name>` with a `<file name>.json` metadata
//! sidecar.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::error::{ReportError, ReportResult};
use crate::format::SecondaryBlock;

/// Metadata written alongside a completed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Unique report identifier
    pub report_id: String,
    /// Owning device
    pub device: DeviceId,
    /// Failure code
    pub code: u32,
    /// Failure arguments
    pub args: [u64; 4],
    /// Per-device report counter
    pub count: u64,
    /// Short driver name
    pub short_driver_name: String,
    /// Full driver name
    pub full_driver_name: String,
    /// Report type
    pub report_type: String,
    /// Dump file name
    pub file_name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Completion time
    pub completed_at: DateTime<Utc>,
    /// Dump size in bytes
    pub dump_size: usize,
    /// Secondary data size in bytes
    pub secondary_size: usize,
}

/// A completed report as handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Base directory from the error-report context
    pub base_path: PathBuf,
    /// Dump blob, empty if none was attached
    pub dump: Vec<u8>,
    /// Secondary data blocks
    pub secondary: Vec<SecondaryBlock>,
}

/// Destination for completed reports.
pub trait ReportSink: Send + Sync {
    /// Accept a completed report.
    ///
    /// # Errors
    ///
    /// Returns an error if the report could not be stored.
    fn submit(&self, report: &SubmittedReport) -> ReportResult<()>;
}

/// Sink that keeps every submission in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<SubmittedReport>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every submission, oldest first.
    #[must_use]
    pub fn reports(&self) -> Vec<SubmittedReport> {
        self.reports.lock().clone()
    }

    /// Number of submissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Whether nothing was submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ReportSink for MemorySink {
    fn submit(&self, report: &SubmittedReport) -> ReportResult<()> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

/// Sink that writes reports below the base path of their context.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectorySink;

impl DirectorySink {
    /// Create a directory sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Path of the dump file for `report`.
    #[must_use]
    pub fn dump_path(report: &SubmittedReport) -> PathBuf {
        report
            .base_path
            .join(&report.metadata.report_id)
            .join(&report.metadata.file_name)
    }

    /// Path of the metadata sidecar for `report`.
    #[must_use]
    pub fn metadata_path(report: &SubmittedReport) -> PathBuf {
        let mut path = Self::dump_path(report).into_os_string();
        path.push(".json");
        PathBuf::from(path)
    }

    fn write_secondary(dir: &Path, report: &SubmittedReport) -> ReportResult<()> {
        for (index, block) in report.secondary.iter().enumerate() {
            let path = dir.join(format!("secondary-{index}-{}.bin", block.uuid()));
            fs::write(path, &block.data)?;
        }
        Ok(())
    }
}

impl ReportSink for DirectorySink {
    fn submit(&self, report: &SubmittedReport) -> ReportResult<()> {
        let dump_path = Self::dump_path(report);
        let dir = dump_path
            .parent()
            .ok_or_else(|| ReportError::Io("report path has no parent".to_string()))?;
        fs::create_dir_all(dir)?;

        fs::write(&dump_path, &report.dump)?;
        Self::write_secondary(dir, report)?;
        let json = serde_json::to_vec_pretty(&report.metadata)?;
        fs::write(Self::metadata_path(report), json)?;

        tracing::debug!(
            report_id = %report.metadata.report_id,
            path = %dump_path.display(),
            "report written"
        );
        Ok(())
    }
}
