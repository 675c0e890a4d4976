//! Debug report pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use hangwatch_eventlog::{EventLog, LogLevel, RECORD_SIZE};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::ReportConfig;
use crate::device::DeviceId;
use crate::error::{ReportError, ReportResult};
use crate::format::{DumpContents, DumpHeader, SecondaryBlock, decode_dump, encode_dump};
use crate::report::{DebugReport, ErrorReportContext, ReportInfo, ReportInner, ReportState};
use crate::sink::ReportSink;
use crate::snapshot::Snapshot;

/// Pipeline activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Reports created, including recreated fresh ones.
    pub created: u64,
    /// Reports reused by [`DebugReportPipeline::recreate`].
    pub recreated: u64,
    /// Reports handed to the sink.
    pub completed: u64,
    /// Reports discarded.
    pub canceled: u64,
    /// Sink submissions that failed.
    pub sink_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    recreated: AtomicU64,
    completed: AtomicU64,
    canceled: AtomicU64,
    sink_failures: AtomicU64,
}

/// Creates, extends and files debug reports.
///
/// Each report gets a per-device counter that increases by one for every
/// report created for that device. Completed reports go to the configured
/// [`ReportSink`].
pub struct DebugReportPipeline {
    config: ReportConfig,
    log: Arc<EventLog>,
    sink: Arc<dyn ReportSink>,
    device_counts: Mutex<HashMap<DeviceId, u64>>,
    live_snapshots: Arc<AtomicUsize>,
    counters: Counters,
}

impl DebugReportPipeline {
    /// Create a pipeline that embeds entries from `log` into dumps.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: ReportConfig,
        log: Arc<EventLog>,
        sink: Arc<dyn ReportSink>,
    ) -> ReportResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            log,
            sink,
            device_counts: Mutex::new(HashMap::new()),
            live_snapshots: Arc::new(AtomicUsize::new(0)),
            counters: Counters::default(),
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    fn next_count(&self, device: DeviceId) -> u64 {
        let mut counts = self.device_counts.lock();
        let count = counts.entry(device).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Create a pending report for `device`.
    pub fn create(&self, device: DeviceId, code: u32, args: [u64; 4]) -> DebugReport {
        let count = self.next_count(device);
        let report_id = Uuid::new_v4();
        let file_name = format!("{}-{count}.dmp", self.config.short_driver_name);
        self.counters.created.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(%device, code, count, %report_id, "debug report created");
        DebugReport::from_inner(ReportInner {
            device,
            code,
            args,
            count,
            short_driver_name: self.config.short_driver_name.clone(),
            full_driver_name: self.config.full_driver_name.clone(),
            context: ErrorReportContext {
                base_path: self.config.base_path.clone(),
                report_type: self.config.report_type.clone(),
                report_id,
                file_name,
            },
            secondary: Vec::new(),
            dump: None,
            state: ReportState::Pending,
            created_at: Utc::now(),
        })
    }

    /// Reuse `previous` with a new code and arguments if it is still pending
    /// and belongs to `device`; otherwise create a fresh report.
    ///
    /// A reused report keeps its id and counter, keeps its secondary data and
    /// drops its dump.
    pub fn recreate(
        &self,
        device: DeviceId,
        code: u32,
        args: [u64; 4],
        previous: &DebugReport,
    ) -> DebugReport {
        {
            let mut inner = previous.inner.lock();
            if inner.state == ReportState::Pending && inner.device == device {
                inner.code = code;
                inner.args = args;
                inner.dump = None;
                self.counters.recreated.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    %device,
                    code,
                    count = inner.count,
                    report_id = %inner.context.report_id,
                    "debug report recreated"
                );
                return previous.clone();
            }
        }
        self.create(device, code, args)
    }

    /// Append a secondary data block.
    ///
    /// Returns `false` if the report is finished or the configured secondary
    /// data limit would be exceeded.
    pub fn attach_secondary_data(&self, report: &DebugReport, guid: Uuid, data: &[u8]) -> bool {
        let mut inner = report.inner.lock();
        if inner.state != ReportState::Pending {
            return false;
        }
        let total = inner.secondary_size().saturating_add(data.len());
        if total > self.config.max_secondary_data {
            tracing::warn!(
                report_id = %inner.context.report_id,
                size = total,
                limit = self.config.max_secondary_data,
                "secondary data rejected"
            );
            return false;
        }
        inner.secondary.push(SecondaryBlock::new(guid, data.to_vec()));
        true
    }

    /// Attach `snapshot` as the report's dump, replacing any previous dump.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidState`] if the report is finished and
    /// [`ReportError::SizeLimit`] if the dump is too large.
    pub fn attach_dump(&self, report: &DebugReport, snapshot: Snapshot) -> ReportResult<()> {
        if snapshot.len() > self.config.max_dump_size {
            return Err(ReportError::size_limit(
                "dump",
                snapshot.len(),
                self.config.max_dump_size,
            ));
        }
        let mut inner = report.inner.lock();
        inner.ensure_pending()?;
        inner.dump = Some(snapshot.take_bytes());
        Ok(())
    }

    /// Hand the report to the sink.
    ///
    /// The report is marked completed before the sink runs, so a sink
    /// failure still consumes it.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidState`] if the report was already
    /// completed or canceled, or the sink's error.
    pub fn complete(&self, report: &DebugReport) -> ReportResult<()> {
        let submission = {
            let mut inner = report.inner.lock();
            inner.ensure_pending()?;
            inner.state = ReportState::Completed;
            inner.submission()
        };
        self.counters.completed.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = self.sink.submit(&submission) {
            self.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                report_id = %submission.metadata.report_id,
                error = %err,
                "report sink failed"
            );
            return Err(ReportError::Sink(err.to_string()));
        }
        tracing::info!(
            report_id = %submission.metadata.report_id,
            device = %submission.metadata.device,
            code = submission.metadata.code,
            count = submission.metadata.count,
            "debug report completed"
        );
        Ok(())
    }

    /// Discard the report.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidState`] if the report was already
    /// completed or canceled.
    pub fn cancel(&self, report: &DebugReport) -> ReportResult<()> {
        let mut inner = report.inner.lock();
        inner.ensure_pending()?;
        inner.state = ReportState::Canceled;
        inner.dump = None;
        inner.secondary.clear();
        self.counters.canceled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(report_id = %inner.context.report_id, "debug report canceled");
        Ok(())
    }

    /// Size, code, counter and dump size of a report.
    #[must_use]
    pub fn query_info(&self, report: &DebugReport) -> ReportInfo {
        let inner = report.inner.lock();
        let dump_size = inner.dump_size();
        ReportInfo {
            size: dump_size.saturating_add(inner.secondary_size()),
            code: inner.code,
            count: inner.count,
            dump_size,
        }
    }

    fn recent_log_records(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; self.config.recent_log_entries.saturating_mul(RECORD_SIZE)];
        let written = self.log.copy_recent(
            LogLevel::DmmEvent,
            self.config.recent_log_entries,
            &mut buffer,
        );
        buffer.truncate(written);
        buffer
    }

    fn build_snapshot(
        &self,
        header: DumpHeader,
        secondary: Vec<SecondaryBlock>,
    ) -> ReportResult<Snapshot> {
        let contents = DumpContents {
            header,
            log_records: self.recent_log_records(),
            secondary,
        };
        let bytes = encode_dump(&contents)?;
        if bytes.len() > self.config.max_dump_size {
            return Err(ReportError::size_limit(
                "dump",
                bytes.len(),
                self.config.max_dump_size,
            ));
        }
        Ok(Snapshot::new(bytes, Arc::clone(&self.live_snapshots)))
    }

    /// Build a dump containing recent log entries and optional secondary data.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::SizeLimit`] if the dump or the secondary data is
    /// too large, or a serialization error.
    pub fn create_snapshot(
        &self,
        secondary_guid: Option<Uuid>,
        secondary_data: &[u8],
    ) -> ReportResult<Snapshot> {
        if secondary_data.len() > self.config.max_secondary_data {
            return Err(ReportError::size_limit(
                "secondary data",
                secondary_data.len(),
                self.config.max_secondary_data,
            ));
        }
        let secondary = match secondary_guid {
            Some(guid) => vec![SecondaryBlock::new(guid, secondary_data.to_vec())],
            None => Vec::new(),
        };
        self.build_snapshot(DumpHeader::new(None, 0, [0; 4]), secondary)
    }

    /// Release a snapshot.
    pub fn destroy_snapshot(&self, snapshot: Snapshot) {
        drop(snapshot);
    }

    /// Snapshots created by this pipeline and not yet destroyed or attached.
    #[must_use]
    pub fn live_snapshots(&self) -> usize {
        self.live_snapshots.load(Ordering::Acquire)
    }

    /// Wrap an existing dump in a new pending report for `device`.
    ///
    /// Code and arguments are taken from the dump header.
    ///
    /// # Errors
    ///
    /// Returns a decode or validation error for a malformed dump and
    /// [`ReportError::SizeLimit`] for an oversized one.
    pub fn create_from_dump(&self, device: DeviceId, dump: &[u8]) -> ReportResult<DebugReport> {
        if dump.len() > self.config.max_dump_size {
            return Err(ReportError::size_limit(
                "dump",
                dump.len(),
                self.config.max_dump_size,
            ));
        }
        let contents = decode_dump(dump)?;
        let report = self.create(device, contents.header.code, contents.header.args);
        report.inner.lock().dump = Some(dump.to_vec());
        Ok(report)
    }

    /// Create (or recreate from `previous`) a report and attach a dump of the
    /// current log state.
    ///
    /// The report is returned pending. If building the dump fails, the
    /// report is returned without a dump together with the error.
    pub fn capture(
        &self,
        device: DeviceId,
        code: u32,
        args: [u64; 4],
        previous: Option<&DebugReport>,
    ) -> (DebugReport, ReportResult<()>) {
        let report = match previous {
            Some(previous) => self.recreate(device, code, args, previous),
            None => self.create(device, code, args),
        };
        let attached = self
            .build_snapshot(DumpHeader::new(Some(device), code, args), Vec::new())
            .and_then(|snapshot| self.attach_dump(&report, snapshot));
        (report, attached)
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            created: self.counters.created.load(Ordering::Relaxed),
            recreated: self.counters.recreated.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            canceled: self.counters.canceled.load(Ordering::Relaxed),
            sink_failures: self.counters.sink_failures.load(Ordering::Relaxed),
        }
    }
}

impl core::fmt::Debug for DebugReportPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DebugReportPipeline")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .field("live_snapshots", &self.live_snapshots())
            .finish_non_exhaustive()
    }
}
