//! Integration tests for hangwatch-report

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hangwatch_eventlog::{EventLog, LogLevel};
use hangwatch_report::prelude::*;
use hangwatch_report::{
    DumpHeader, QueueStats, ReportMetadata, SecondaryBlock, SubmittedReport, decode_dump,
};
use hangwatch_test_helpers::prelude::*;
use tempfile::TempDir;
use uuid::Uuid;

fn memory_pipeline(
    config: ReportConfig,
) -> ReportResult<(DebugReportPipeline, Arc<MemorySink>, Arc<EventLog>)> {
    let log = Arc::new(EventLog::default());
    let sink = Arc::new(MemorySink::new());
    let pipeline = DebugReportPipeline::new(config, log.clone(), sink.clone())?;
    Ok((pipeline, sink, log))
}

#[test]
fn test_recreate_reuses_pending_identity() -> TestResult {
    let (pipeline, _, _) = memory_pipeline(ReportConfig::default())?;
    let device = DeviceId::new(10);

    let first = pipeline.create(device, 0x1, [1, 0, 0, 0]);
    let again = pipeline.recreate(device, 0x2, [2, 0, 0, 0], &first);
    assert!(again.same_report(&first));
    assert_eq!(again.id(), first.id());
    assert_eq!(again.count(), 1);
    assert_eq!(again.code(), 0x2);
    assert_eq!(first.args()[0], 2);
    assert_eq!(pipeline.stats().recreated, 1);
    Ok(())
}

#[test]
fn test_recreate_after_finish_creates_fresh_report() -> TestResult {
    let (pipeline, _, _) = memory_pipeline(ReportConfig::default())?;
    let device = DeviceId::new(11);

    let first = pipeline.create(device, 0x1, [0; 4]);
    pipeline.cancel(&first)?;
    let fresh = pipeline.recreate(device, 0x3, [0; 4], &first);
    assert!(!fresh.same_report(&first));
    assert_ne!(fresh.id(), first.id());
    assert_eq!(fresh.count(), 2);
    assert_eq!(fresh.state(), ReportState::Pending);
    Ok(())
}

#[test]
fn test_query_info_reports_sizes() -> TestResult {
    let (pipeline, _, _) = memory_pipeline(ReportConfig::default())?;
    let report = pipeline.create(DeviceId::new(1), 0x1a0, [0; 4]);
    assert!(pipeline.attach_secondary_data(&report, Uuid::new_v4(), &[7; 100]));

    let snapshot = pipeline.create_snapshot(None, &[])?;
    let dump_size = snapshot.len();
    pipeline.attach_dump(&report, snapshot)?;

    let info = pipeline.query_info(&report);
    assert_eq!(info.code, 0x1a0);
    assert_eq!(info.count, 1);
    assert_eq!(info.dump_size, dump_size);
    assert_eq!(info.size, dump_size + 100);
    Ok(())
}

#[test]
fn test_snapshot_embeds_recent_log_entries() -> TestResult {
    let config = ReportConfig::builder().recent_log_entries(2).build()?;
    let (pipeline, _, log) = memory_pipeline(config)?;
    log.commit(log.new_trace().with_parameters(&[1]));
    log.commit(log.new_warning().with_parameters(&[2]));
    let last = log.commit(log.new_error().with_parameters(&[3]));

    let guid = Uuid::new_v4();
    let snapshot = pipeline.create_snapshot(Some(guid), b"extra")?;
    assert_eq!(pipeline.live_snapshots(), 1);

    let contents = snapshot.contents()?;
    let entries = contents.log_entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].event_order, last.event_order());
    assert_eq!(entries[0].level, LogLevel::Error);
    assert_eq!(contents.secondary, vec![SecondaryBlock::new(guid, b"extra".to_vec())]);

    pipeline.destroy_snapshot(snapshot);
    assert_eq!(pipeline.live_snapshots(), 0);
    Ok(())
}

#[test]
fn test_snapshot_respects_size_limits() -> TestResult {
    let config = ReportConfig::builder()
        .max_dump_size(64)
        .max_secondary_data(16)
        .build()?;
    let (pipeline, _, _) = memory_pipeline(config)?;

    assert!(matches!(
        pipeline.create_snapshot(Some(Uuid::nil()), &[0; 17]),
        Err(ReportError::SizeLimit(_))
    ));
    assert!(matches!(
        pipeline.create_snapshot(Some(Uuid::nil()), &[0; 16]),
        Err(ReportError::SizeLimit(_))
    ));
    assert_eq!(pipeline.live_snapshots(), 0);
    Ok(())
}

#[test]
fn test_create_from_dump_takes_code_from_header() -> TestResult {
    let (pipeline, _, _) = memory_pipeline(ReportConfig::default())?;
    let (source, attached) = pipeline.capture(DeviceId::new(4), 0x117, [5, 6, 7, 8], None);
    attached?;
    let dump = must_some(source.dump(), "captured dump");

    let wrapped = pipeline.create_from_dump(DeviceId::new(4), &dump)?;
    assert_eq!(wrapped.code(), 0x117);
    assert_eq!(wrapped.args(), [5, 6, 7, 8]);
    assert_eq!(wrapped.count(), 2);
    assert_eq!(wrapped.dump(), Some(dump));

    assert!(pipeline.create_from_dump(DeviceId::new(4), b"not a dump").is_err());
    Ok(())
}

#[test]
fn test_create_from_dump_rejects_foreign_magic() -> TestResult {
    let (pipeline, _, _) = memory_pipeline(ReportConfig::default())?;
    let mut header = DumpHeader::new(None, 1, [0; 4]);
    header.magic = *b"ZZZZ";
    let dump = hangwatch_report::encode_dump(&hangwatch_report::DumpContents {
        header,
        log_records: Vec::new(),
        secondary: Vec::new(),
    })?;

    assert!(matches!(
        pipeline.create_from_dump(DeviceId::new(1), &dump),
        Err(ReportError::InvalidMagic { .. })
    ));
    Ok(())
}

#[test]
fn test_directory_sink_writes_dump_and_sidecar() -> TestResult {
    let temp_dir = TempDir::new()?;
    let config = ReportConfig::builder()
        .base_path(temp_dir.path())
        .driver_names("hwtest", "hangwatch test driver")
        .build()?;
    let pipeline = DebugReportPipeline::new(
        config,
        Arc::new(EventLog::default()),
        Arc::new(DirectorySink::new()),
    )?;

    let (report, attached) = pipeline.capture(DeviceId::new(9), 0x1a0, [1, 2, 3, 4], None);
    attached?;
    assert!(pipeline.attach_secondary_data(&report, Uuid::new_v4(), b"ctx"));
    pipeline.complete(&report)?;

    let dir = temp_dir.path().join(report.id().to_string());
    let dump_path = dir.join("hwtest-1.dmp");
    let dump = std::fs::read(&dump_path)?;
    assert_eq!(decode_dump(&dump)?.header.code, 0x1a0);

    let sidecar = std::fs::read(dir.join("hwtest-1.dmp.json"))?;
    let metadata: ReportMetadata = serde_json::from_slice(&sidecar)?;
    assert_eq!(metadata.report_id, report.id().to_string());
    assert_eq!(metadata.full_driver_name, "hangwatch test driver");
    assert_eq!(metadata.secondary_size, 3);
    assert_eq!(std::fs::read_dir(&dir)?.count(), 3);
    Ok(())
}

#[test]
fn test_failing_sink_consumes_report() -> TestResult {
    struct FailingSink;

    impl ReportSink for FailingSink {
        fn submit(&self, _report: &SubmittedReport) -> ReportResult<()> {
            Err(ReportError::Io("disk full".to_string()))
        }
    }

    let pipeline = DebugReportPipeline::new(
        ReportConfig::default(),
        Arc::new(EventLog::default()),
        Arc::new(FailingSink),
    )?;
    let report = pipeline.create(DeviceId::new(1), 1, [0; 4]);
    assert!(matches!(pipeline.complete(&report), Err(ReportError::Sink(_))));
    assert_eq!(report.state(), ReportState::Completed);
    assert_eq!(pipeline.stats().sink_failures, 1);
    Ok(())
}

struct SlowSink {
    delay: Duration,
    stored: MemorySink,
}

impl ReportSink for SlowSink {
    fn submit(&self, report: &SubmittedReport) -> ReportResult<()> {
        thread::sleep(self.delay);
        self.stored.submit(report)
    }
}

#[test]
fn test_queued_sink_completes_without_waiting_for_delivery() -> TestResult {
    let slow = Arc::new(SlowSink {
        delay: Duration::from_millis(200),
        stored: MemorySink::new(),
    });
    let queued = Arc::new(QueuedSink::spawn(slow.clone())?);
    let pipeline = DebugReportPipeline::new(
        ReportConfig::default(),
        Arc::new(EventLog::default()),
        queued.clone(),
    )?;

    let started = Instant::now();
    let reports: Vec<_> = (0..3)
        .map(|code| pipeline.create(DeviceId::new(5), code, [0; 4]))
        .collect();
    for report in &reports {
        pipeline.complete(report)?;
    }
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(pipeline.stats().completed, 3);

    assert!(queued.flush(Duration::from_secs(5)));
    let delivered: Vec<u32> = slow.stored.reports().iter().map(|r| r.metadata.code).collect();
    assert_eq!(delivered, vec![0, 1, 2]);
    assert_eq!(
        queued.stats(),
        QueueStats {
            queued: 3,
            delivered: 3,
            failed: 0,
            pending: 0,
        }
    );
    Ok(())
}

#[test]
fn test_queued_sink_drains_on_shutdown_then_rejects() -> TestResult {
    struct RejectOdd(MemorySink);

    impl ReportSink for RejectOdd {
        fn submit(&self, report: &SubmittedReport) -> ReportResult<()> {
            if report.metadata.code % 2 == 1 {
                return Err(ReportError::Io("disk full".to_string()));
            }
            self.0.submit(report)
        }
    }

    let inner = Arc::new(RejectOdd(MemorySink::new()));
    let queued = Arc::new(QueuedSink::with_thread_name(inner.clone(), "report-test-sink")?);
    let pipeline = DebugReportPipeline::new(
        ReportConfig::default(),
        Arc::new(EventLog::default()),
        queued.clone(),
    )?;
    for code in 0..4 {
        let report = pipeline.create(DeviceId::new(6), code, [0; 4]);
        pipeline.complete(&report)?;
    }

    queued.shutdown();
    assert_eq!(inner.0.len(), 2);
    let stats = queued.stats();
    assert_eq!((stats.delivered, stats.failed, stats.pending), (2, 2, 0));

    let late = pipeline.create(DeviceId::new(6), 8, [0; 4]);
    assert!(matches!(pipeline.complete(&late), Err(ReportError::Sink(_))));
    assert_eq!(pipeline.stats().sink_failures, 1);
    Ok(())
}

#[test]
fn test_concurrent_creates_get_distinct_counts() -> TestResult {
    let (pipeline, _, _) = memory_pipeline(ReportConfig::default())?;
    let pipeline = Arc::new(pipeline);
    let device = DeviceId::new(77);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                (0..25)
                    .map(|_| pipeline.create(device, 0, [0; 4]).count())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut counts = Vec::new();
    for handle in handles {
        counts.extend(handle.join().map_err(|_| "creator panicked")?);
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=200).collect::<Vec<u64>>());
    Ok(())
}
