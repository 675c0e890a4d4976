//! Background delivery of completed reports.
//!
//! [`QueuedSink`] accepts submissions without blocking and hands them to an
//! inner [`ReportSink`] on a dedicated worker thread, oldest first. Callers
//! on latency-bound threads (the timer dispatcher in particular) never wait
//! for a slow sink.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{ReportError, ReportResult};
use crate::sink::{ReportSink, SubmittedReport};

/// Default name of the delivery thread.
pub const DEFAULT_SINK_THREAD_NAME: &str = "hangwatch-sink";

/// Delivery counters of a [`QueuedSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Reports accepted for delivery
    pub queued: u64,
    /// Reports the inner sink stored
    pub delivered: u64,
    /// Reports the inner sink rejected
    pub failed: u64,
    /// Reports waiting for the worker
    pub pending: usize,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<SubmittedReport>,
    in_flight: bool,
    shutdown: bool,
    queued: u64,
    delivered: u64,
    failed: u64,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.in_flight
    }
}

struct Shared {
    inner: Arc<dyn ReportSink>,
    state: Mutex<QueueState>,
    wakeup: Condvar,
    drained: Condvar,
    thread_id: Mutex<Option<ThreadId>>,
}

/// Sink that delivers to an inner sink on its own thread.
///
/// Dropping the sink delivers whatever is still queued and then stops the
/// worker.
pub struct QueuedSink {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedSink {
    /// Start a worker named [`DEFAULT_SINK_THREAD_NAME`] in front of `inner`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if the thread cannot be spawned.
    pub fn spawn(inner: Arc<dyn ReportSink>) -> ReportResult<Self> {
        Self::with_thread_name(inner, DEFAULT_SINK_THREAD_NAME)
    }

    /// Start a worker thread called `name` in front of `inner`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Configuration`] for an empty name and
    /// [`ReportError::Io`] if the thread cannot be spawned.
    pub fn with_thread_name(inner: Arc<dyn ReportSink>, name: &str) -> ReportResult<Self> {
        if name.is_empty() {
            return Err(ReportError::Configuration(
                "sink thread name must not be empty".to_string(),
            ));
        }
        let shared = Arc::new(Shared {
            inner,
            state: Mutex::new(QueueState::default()),
            wakeup: Condvar::new(),
            drained: Condvar::new(),
            thread_id: Mutex::new(None),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&worker))?;
        *shared.thread_id.lock() = Some(handle.thread().id());

        tracing::debug!(thread = name, "report sink worker started");
        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Delivery counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.state.lock();
        QueueStats {
            queued: state.queued,
            delivered: state.delivered,
            failed: state.failed,
            pending: state.queue.len(),
        }
    }

    /// Wait until every accepted report went through the inner sink.
    ///
    /// Returns `false` if `timeout` elapsed first. Returns immediately on the
    /// worker thread.
    pub fn flush(&self, timeout: Duration) -> bool {
        if self.is_worker_thread() {
            return false;
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            if self.shared.drained.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    /// Whether [`QueuedSink::shutdown`] was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Stop accepting reports, deliver the queued ones and join the worker.
    ///
    /// The join is skipped on the worker thread itself. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.shared.wakeup.notify_all();

        if self.is_worker_thread() {
            return;
        }
        if let Some(handle) = self.thread.lock().take()
            && handle.join().is_err()
        {
            tracing::error!("report sink worker panicked");
        }
        tracing::debug!("report sink worker stopped");
    }

    fn is_worker_thread(&self) -> bool {
        *self.shared.thread_id.lock() == Some(thread::current().id())
    }
}

impl ReportSink for QueuedSink {
    fn submit(&self, report: &SubmittedReport) -> ReportResult<()> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(ReportError::Sink("sink worker is shut down".to_string()));
        }
        state.queue.push_back(report.clone());
        state.queued = state.queued.saturating_add(1);
        drop(state);
        self.shared.wakeup.notify_one();
        Ok(())
    }
}

impl Drop for QueuedSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for QueuedSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueuedSink")
            .field("stats", &self.stats())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if let Some(report) = state.queue.pop_front() {
            state.in_flight = true;
            let outcome = MutexGuard::unlocked(&mut state, || shared.inner.submit(&report));
            state.in_flight = false;
            match outcome {
                Ok(()) => state.delivered = state.delivered.saturating_add(1),
                Err(err) => {
                    state.failed = state.failed.saturating_add(1);
                    tracing::warn!(
                        report_id = %report.metadata.report_id,
                        error = %err,
                        "report sink failed"
                    );
                }
            }
            if state.is_idle() {
                shared.drained.notify_all();
            }
            continue;
        }
        if state.shutdown {
            break;
        }
        shared.wakeup.wait(&mut state);
    }
    drop(state);
    shared.drained.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn test_empty_thread_name_is_rejected() {
        let result = QueuedSink::with_thread_name(Arc::new(MemorySink::new()), "");
        assert!(matches!(result, Err(ReportError::Configuration(_))));
    }

    #[test]
    fn test_idle_queue_flushes_immediately() -> ReportResult<()> {
        let sink = QueuedSink::spawn(Arc::new(MemorySink::new()))?;
        assert!(sink.flush(Duration::ZERO));
        assert_eq!(sink.stats(), QueueStats::default());
        sink.shutdown();
        sink.shutdown();
        assert!(sink.is_shut_down());
        Ok(())
    }
}
