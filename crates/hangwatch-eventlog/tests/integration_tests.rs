//! Integration tests for hangwatch-eventlog

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use hangwatch_eventlog::{
    DebugFlags, DebuggerHook, EventLog, EventLogConfig, LogEntry, LogLevel, LogRecord,
    RECORD_SIZE, ThreadTag, current_event_order, wd_log,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct RecordingDebugger {
    present: bool,
    breaks: AtomicUsize,
}

impl DebuggerHook for RecordingDebugger {
    fn is_present(&self) -> bool {
        self.present
    }

    fn on_break(&self, _entry: &LogEntry) {
        self.breaks.fetch_add(1, Ordering::SeqCst);
    }
}

fn config(capacity: usize) -> EventLogConfig {
    EventLogConfig {
        capacity,
        ..Default::default()
    }
}

#[test]
fn test_orders_increase_across_logs() -> TestResult {
    let a = EventLog::new(config(4))?;
    let b = EventLog::new(config(4))?;

    let first = a.commit(a.new_event());
    let second = b.commit(b.new_event());
    let third = a.commit(a.new_event());

    assert!(first.event_order() < second.event_order());
    assert!(second.event_order() < third.event_order());
    assert!(current_event_order() >= third.event_order());
    Ok(())
}

#[test]
fn test_recent_filters_by_level_most_recent_first() -> TestResult {
    let log = EventLog::new(config(16))?;
    log.commit(log.new_trace());
    let error = log.commit(log.new_error());
    log.commit(log.new_event());
    let critical = log.commit(log.new_critical_error().with_parameters(&[0x1a0, 1, 2, 3, 4]));

    let errors = log.recent(LogLevel::Error, 10);
    assert_eq!(errors, vec![critical.clone(), error]);

    let one = log.recent(LogLevel::Trace, 1);
    assert_eq!(one, vec![critical]);

    assert!(log.recent(LogLevel::All, 10).is_empty());
    Ok(())
}

#[test]
fn test_copy_recent_encodes_records() -> TestResult {
    let log = EventLog::new(config(16))?;
    let first = log.commit(log.new_warning().with_parameters(&[11]));
    let second = log.commit(log.new_error().with_parameters(&[22, 33]));

    let mut buffer = [0u8; RECORD_SIZE * 4];
    let written = log.copy_recent(LogLevel::Warning, 4, &mut buffer);
    assert_eq!(written, RECORD_SIZE * 2);

    let decoded: Vec<LogRecord> = buffer[..written]
        .chunks_exact(RECORD_SIZE)
        .filter_map(LogRecord::from_bytes)
        .collect();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].event_order, second.event_order());
    assert_eq!(decoded[0].parameters[1], 33);
    assert_eq!(decoded[1].event_order, first.event_order());
    assert_eq!(decoded[1].thread, ThreadTag::current());
    Ok(())
}

#[test]
fn test_copy_recent_respects_buffer_size() -> TestResult {
    let log = EventLog::new(config(16))?;
    for _ in 0..5 {
        log.commit(log.new_error());
    }

    let mut small = [0u8; RECORD_SIZE + 10];
    assert_eq!(log.copy_recent(LogLevel::Error, 5, &mut small), RECORD_SIZE);

    let mut buffer = [0u8; RECORD_SIZE * 8];
    assert_eq!(log.copy_recent(LogLevel::All, 5, &mut buffer), 0);
    assert_eq!(log.copy_recent(LogLevel::Error, 0, &mut buffer), 0);
    Ok(())
}

#[test]
fn test_debugger_breaks_only_when_present_and_flagged() -> TestResult {
    let hook = Arc::new(RecordingDebugger {
        present: true,
        breaks: AtomicUsize::new(0),
    });
    let log = EventLog::with_debugger(
        EventLogConfig {
            capacity: 8,
            debug_flags: DebugFlags {
                break_on_assertion: true,
                break_on_error: false,
            },
        },
        hook.clone(),
    )?;

    log.commit(log.new_error());
    log.commit(log.new_warning());
    assert_eq!(hook.breaks.load(Ordering::SeqCst), 0);

    log.commit(log.new_assertion());
    assert_eq!(hook.breaks.load(Ordering::SeqCst), 1);
    assert_eq!(log.stats().breaks, 1);

    let absent = Arc::new(RecordingDebugger {
        present: false,
        breaks: AtomicUsize::new(0),
    });
    let quiet = EventLog::with_debugger(
        EventLogConfig {
            capacity: 8,
            debug_flags: DebugFlags {
                break_on_assertion: true,
                break_on_error: true,
            },
        },
        absent.clone(),
    )?;
    quiet.commit(quiet.new_assertion());
    assert_eq!(absent.breaks.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_break_hook_may_query_the_log() -> TestResult {
    struct Reentrant {
        log: std::sync::OnceLock<Arc<EventLog>>,
        seen: AtomicUsize,
    }

    impl DebuggerHook for Reentrant {
        fn is_present(&self) -> bool {
            true
        }

        fn on_break(&self, _entry: &LogEntry) {
            if let Some(log) = self.log.get() {
                self.seen
                    .store(log.recent(LogLevel::Error, 10).len(), Ordering::SeqCst);
            }
        }
    }

    let hook = Arc::new(Reentrant {
        log: std::sync::OnceLock::new(),
        seen: AtomicUsize::new(0),
    });
    let log = Arc::new(EventLog::with_debugger(
        EventLogConfig {
            capacity: 8,
            debug_flags: DebugFlags {
                break_on_assertion: false,
                break_on_error: true,
            },
        },
        hook.clone(),
    )?);
    let _ = hook.log.set(log.clone());

    log.commit(log.new_error());
    assert_eq!(hook.seen.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_concurrent_writers_keep_ring_sorted() -> TestResult {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 200;

    let log = Arc::new(EventLog::new(config(THREADS * PER_THREAD))?);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let log = Arc::clone(&log);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for n in 0..PER_THREAD {
                    let _ = wd_log!(log, LogLevel::Event, i, n);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().map_err(|_| "writer panicked")?;
    }

    let entries = log.recent(LogLevel::DmmEvent, THREADS * PER_THREAD);
    assert_eq!(entries.len(), THREADS * PER_THREAD);
    assert!(
        entries
            .windows(2)
            .all(|pair| pair[0].event_order() > pair[1].event_order())
    );
    Ok(())
}
