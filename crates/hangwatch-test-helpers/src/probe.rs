//! Recording probe for callbacks invoked from other threads.

use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct ProbeState {
    calls: Vec<(Instant, ThreadId)>,
}

/// Counts callback invocations and lets tests wait for them.
///
/// Cloning shares the underlying record, so one clone can be moved into a
/// callback while the test keeps the other.
///
/// ```rust
/// use std::time::Duration;
/// use hangwatch_test_helpers::CallbackProbe;
///
/// let probe = CallbackProbe::new();
/// let recorder = probe.clone();
/// std::thread::spawn(move || recorder.record());
/// assert!(probe.wait_for(1, Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallbackProbe {
    inner: Arc<(Mutex<ProbeState>, Condvar)>,
}

impl CallbackProbe {
    /// Create an empty probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation on the calling thread.
    pub fn record(&self) {
        let (state, signal) = &*self.inner;
        state
            .lock()
            .calls
            .push((Instant::now(), std::thread::current().id()));
        signal.notify_all();
    }

    /// Number of recorded invocations.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.0.lock().calls.len()
    }

    /// Threads that made each recorded invocation, in order.
    #[must_use]
    pub fn threads(&self) -> Vec<ThreadId> {
        self.inner.0.lock().calls.iter().map(|(_, t)| *t).collect()
    }

    /// Time of the first recorded invocation.
    #[must_use]
    pub fn first_call(&self) -> Option<Instant> {
        self.inner.0.lock().calls.first().map(|(at, _)| *at)
    }

    /// Wait until at least `count` invocations were recorded.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (state, signal) = &*self.inner;
        let mut guard = state.lock();
        while guard.calls.len() < count {
            if signal.wait_until(&mut guard, deadline).timed_out() {
                return guard.calls.len() >= count;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_counts_across_threads() {
        let probe = CallbackProbe::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let probe = probe.clone();
                std::thread::spawn(move || probe.record())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(probe.wait_for(4, Duration::from_secs(1)));
        assert_eq!(probe.count(), 4);
        assert_eq!(probe.threads().len(), 4);
    }

    #[test]
    fn test_wait_for_times_out() {
        let probe = CallbackProbe::new();
        assert!(!probe.wait_for(1, Duration::from_millis(10)));
        assert!(probe.first_call().is_none());
    }
}
