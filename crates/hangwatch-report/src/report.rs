//! Debug report handles.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceId;
use crate::error::{ReportError, ReportResult};
use crate::format::SecondaryBlock;
use crate::sink::{ReportMetadata, SubmittedReport};

/// Lifecycle state of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportState {
    /// Created, may still receive secondary data.
    Pending,
    /// Handed to the sink.
    Completed,
    /// Discarded.
    Canceled,
}

impl ReportState {
    /// State name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }
}

impl core::fmt::Display for ReportState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how an error report is filed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReportContext {
    /// Base directory.
    pub base_path: PathBuf,
    /// Report type.
    pub report_type: String,
    /// Unique report identifier.
    pub report_id: Uuid,
    /// Target file name for the dump.
    pub file_name: String,
}

impl ErrorReportContext {
    /// Directory the report files belong in: `<base>/<report id>`.
    #[must_use]
    pub fn report_dir(&self) -> PathBuf {
        self.base_path.join(self.report_id.to_string())
    }
}

/// Summary returned by [`crate::DebugReportPipeline::query_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInfo {
    /// Total payload size: dump plus secondary data.
    pub size: usize,
    /// Failure code.
    pub code: u32,
    /// Per-device report counter.
    pub count: u64,
    /// Dump size in bytes.
    pub dump_size: usize,
}

#[derive(Debug)]
pub(crate) struct ReportInner {
    pub(crate) device: DeviceId,
    pub(crate) code: u32,
    pub(crate) args: [u64; 4],
    pub(crate) count: u64,
    pub(crate) short_driver_name: String,
    pub(crate) full_driver_name: String,
    pub(crate) context: ErrorReportContext,
    pub(crate) secondary: Vec<SecondaryBlock>,
    pub(crate) dump: Option<Vec<u8>>,
    pub(crate) state: ReportState,
    pub(crate) created_at: DateTime<Utc>,
}

impl ReportInner {
    pub(crate) fn secondary_size(&self) -> usize {
        self.secondary.iter().map(|block| block.data.len()).sum()
    }

    pub(crate) fn dump_size(&self) -> usize {
        self.dump.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn ensure_pending(&self) -> ReportResult<()> {
        if self.state == ReportState::Pending {
            Ok(())
        } else {
            Err(ReportError::InvalidState {
                report_id: self.context.report_id.to_string(),
                state: self.state,
            })
        }
    }

    pub(crate) fn submission(&self) -> SubmittedReport {
        SubmittedReport {
            metadata: ReportMetadata {
                report_id: self.context.report_id.to_string(),
                device: self.device,
                code: self.code,
                args: self.args,
                count: self.count,
                short_driver_name: self.short_driver_name.clone(),
                full_driver_name: self.full_driver_name.clone(),
                report_type: self.context.report_type.clone(),
                file_name: self.context.file_name.clone(),
                created_at: self.created_at,
                completed_at: Utc::now(),
                dump_size: self.dump_size(),
                secondary_size: self.secondary_size(),
            },
            base_path: self.context.base_path.clone(),
            dump: self.dump.clone().unwrap_or_default(),
            secondary: self.secondary.clone(),
        }
    }
}

/// Shared handle to one debug report.
///
/// Clones refer to the same report. A report is created pending and ends in
/// exactly one of [`ReportState::Completed`] or [`ReportState::Canceled`].
#[derive(Debug, Clone)]
pub struct DebugReport {
    pub(crate) inner: Arc<Mutex<ReportInner>>,
}

impl DebugReport {
    pub(crate) fn from_inner(inner: ReportInner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.lock().context.report_id
    }

    /// Owning device.
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.inner.lock().device
    }

    /// Failure code.
    #[must_use]
    pub fn code(&self) -> u32 {
        self.inner.lock().code
    }

    /// Failure arguments.
    #[must_use]
    pub fn args(&self) -> [u64; 4] {
        self.inner.lock().args
    }

    /// Per-device report counter.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ReportState {
        self.inner.lock().state
    }

    /// Whether the report can still be extended, completed or canceled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state() == ReportState::Pending
    }

    /// Error-report context.
    #[must_use]
    pub fn context(&self) -> ErrorReportContext {
        self.inner.lock().context.clone()
    }

    /// Short and full driver names.
    #[must_use]
    pub fn driver_names(&self) -> (String, String) {
        let inner = self.inner.lock();
        (
            inner.short_driver_name.clone(),
            inner.full_driver_name.clone(),
        )
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.lock().created_at
    }

    /// Copy of the attached dump blob, if any.
    #[must_use]
    pub fn dump(&self) -> Option<Vec<u8>> {
        self.inner.lock().dump.clone()
    }

    /// Whether `other` refers to the same report.
    #[must_use]
    pub fn same_report(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner(state: ReportState) -> ReportInner {
        ReportInner {
            device: DeviceId::new(7),
            code: 0x1a0,
            args: [0; 4],
            count: 1,
            short_driver_name: "hw".to_string(),
            full_driver_name: "hangwatch".to_string(),
            context: ErrorReportContext {
                base_path: PathBuf::from("reports"),
                report_type: "WatchdogTimeout".to_string(),
                report_id: Uuid::nil(),
                file_name: "hw-1.dmp".to_string(),
            },
            secondary: vec![SecondaryBlock::new(Uuid::nil(), vec![0; 10])],
            dump: Some(vec![0; 32]),
            state,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ensure_pending() {
        assert!(inner(ReportState::Pending).ensure_pending().is_ok());
        assert!(matches!(
            inner(ReportState::Canceled).ensure_pending(),
            Err(ReportError::InvalidState {
                state: ReportState::Canceled,
                ..
            })
        ));
    }

    #[test]
    fn test_submission_carries_sizes() {
        let submission = inner(ReportState::Pending).submission();
        assert_eq!(submission.metadata.dump_size, 32);
        assert_eq!(submission.metadata.secondary_size, 10);
        assert_eq!(submission.metadata.file_name, "hw-1.dmp");
    }

    #[test]
    fn test_report_dir() {
        let context = inner(ReportState::Pending).context;
        assert_eq!(
            context.report_dir(),
            PathBuf::from("reports").join(Uuid::nil().to_string())
        );
    }

    #[test]
    fn test_clones_share_state() {
        let report = DebugReport::from_inner(inner(ReportState::Pending));
        let clone = report.clone();
        clone.inner.lock().state = ReportState::Completed;
        assert_eq!(report.state(), ReportState::Completed);
        assert!(report.same_report(&clone));
    }
}
