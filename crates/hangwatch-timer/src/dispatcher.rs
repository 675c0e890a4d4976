//! Timer dispatcher thread and timer handles.
//!
//! A [`TimerDispatcher`] owns one thread that drains a min-heap of due
//! times. Every [`TimerHandle`] binds one callback; scheduling a handle
//! pushes a heap entry tagged with the handle's current generation, and
//! cancelling bumps the generation so stale entries are skipped when they
//! surface.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{TimerError, TimerResult};
use crate::metrics::DispatchMetrics;

/// What the dispatcher does with a timer once its callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Leave the timer disarmed.
    Stop,
    /// Schedule the timer again, this long after the callback returned.
    Rearm(Duration),
}

/// Callback bound to a timer. Runs on the dispatcher thread.
pub type TimerCallback = Box<dyn FnMut() -> TimerAction + Send + 'static>;

/// Identifier of a timer within its dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Name of the dispatcher thread.
    pub thread_name: String,
    /// Lateness samples kept for percentile queries.
    pub lateness_samples: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name: "hangwatch-timer".to_string(),
            lateness_samples: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    due: Instant,
    seq: u64,
    id: TimerId,
    generation: u64,
}

struct TimerSlot {
    callback: Option<TimerCallback>,
    generation: u64,
    due: Option<Instant>,
}

struct DispatchState {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    timers: HashMap<TimerId, TimerSlot>,
    running: Option<TimerId>,
    next_id: u64,
    next_seq: u64,
    shutdown: bool,
    metrics: DispatchMetrics,
}

impl DispatchState {
    fn push(&mut self, id: TimerId, generation: u64, due: Instant) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(Reverse(HeapEntry {
            due,
            seq,
            id,
            generation,
        }));
    }
}

struct Shared {
    state: Mutex<DispatchState>,
    wakeup: Condvar,
    idle: Condvar,
    thread_id: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn is_dispatcher_thread(&self) -> bool {
        *self.thread_id.lock() == Some(thread::current().id())
    }
}

/// Owner of the dispatcher thread.
///
/// Dropping the dispatcher shuts it down; pending timers never fire
/// afterwards and their handles report [`TimerError::ShutDown`].
pub struct TimerDispatcher {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerDispatcher {
    /// Start a dispatcher with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::SpawnFailed`] if the thread cannot be spawned.
    pub fn new() -> TimerResult<Self> {
        Self::with_config(DispatcherConfig::default())
    }

    /// Start a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidConfig`] for an empty thread name and
    /// [`TimerError::SpawnFailed`] if the thread cannot be spawned.
    pub fn with_config(config: DispatcherConfig) -> TimerResult<Self> {
        if config.thread_name.is_empty() {
            return Err(TimerError::InvalidConfig(
                "thread name must not be empty".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(DispatchState {
                heap: BinaryHeap::new(),
                timers: HashMap::new(),
                running: None,
                next_id: 1,
                next_seq: 0,
                shutdown: false,
                metrics: DispatchMetrics::with_capacity(config.lateness_samples),
            }),
            wakeup: Condvar::new(),
            idle: Condvar::new(),
            thread_id: Mutex::new(None),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(&worker))
            .map_err(TimerError::spawn_failed)?;
        *shared.thread_id.lock() = Some(handle.thread().id());

        tracing::debug!(thread = %config.thread_name, "timer dispatcher started");
        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Bind `callback` to a new, disarmed timer.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::ShutDown`] after [`TimerDispatcher::shutdown`].
    pub fn create_timer<F>(&self, callback: F) -> TimerResult<TimerHandle>
    where
        F: FnMut() -> TimerAction + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(TimerError::ShutDown);
        }
        let id = TimerId(state.next_id);
        state.next_id = state.next_id.wrapping_add(1);
        state.timers.insert(
            id,
            TimerSlot {
                callback: Some(Box::new(callback)),
                generation: 0,
                due: None,
            },
        );
        Ok(TimerHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Whether the caller is running on the dispatcher thread.
    #[must_use]
    pub fn is_dispatcher_thread(&self) -> bool {
        self.shared.is_dispatcher_thread()
    }

    /// Number of timers currently scheduled.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .timers
            .values()
            .filter(|slot| slot.due.is_some())
            .count()
    }

    /// Snapshot of dispatch metrics.
    #[must_use]
    pub fn metrics(&self) -> DispatchMetrics {
        self.shared.state.lock().metrics.clone()
    }

    /// Whether the dispatcher has been shut down.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Stop the dispatcher thread and drop every bound callback.
    ///
    /// Waits for an in-flight callback to return unless called from the
    /// dispatcher thread itself. Idempotent.
    pub fn shutdown(&self) {
        let callbacks: Vec<TimerCallback> = {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.heap.clear();
            state
                .timers
                .drain()
                .filter_map(|(_, mut slot)| slot.callback.take())
                .collect()
        };
        self.shared.wakeup.notify_all();
        self.shared.idle.notify_all();
        drop(callbacks);

        if self.shared.is_dispatcher_thread() {
            return;
        }
        if let Some(handle) = self.thread.lock().take()
            && handle.join().is_err()
        {
            tracing::error!("timer dispatcher thread panicked");
        }
        tracing::debug!("timer dispatcher stopped");
    }
}

impl Drop for TimerDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for TimerDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimerDispatcher")
            .field("armed", &self.armed_count())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Handle to one timer. Dropping it unbinds the callback.
///
/// The handle does not keep the dispatcher alive.
pub struct TimerHandle {
    id: TimerId,
    shared: Weak<Shared>,
}

impl TimerHandle {
    /// Identifier of this timer.
    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Arm the timer to fire `after` from now, replacing any pending schedule.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::ShutDown`] if the dispatcher is gone.
    pub fn schedule(&self, after: Duration) -> TimerResult<()> {
        self.schedule_at(Instant::now() + after)
    }

    /// Arm the timer to fire at `due`, replacing any pending schedule.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::ShutDown`] if the dispatcher is gone.
    pub fn schedule_at(&self, due: Instant) -> TimerResult<()> {
        let shared = self.shared.upgrade().ok_or(TimerError::ShutDown)?;
        let mut state = shared.state.lock();
        if state.shutdown {
            return Err(TimerError::ShutDown);
        }
        let Some(slot) = state.timers.get_mut(&self.id) else {
            return Err(TimerError::ShutDown);
        };
        slot.generation = slot.generation.wrapping_add(1);
        slot.due = Some(due);
        let generation = slot.generation;
        state.push(self.id, generation, due);
        drop(state);
        shared.wakeup.notify_one();
        Ok(())
    }

    /// Disarm the timer without waiting for an in-flight callback.
    ///
    /// A callback that is already running completes, and a re-arm it
    /// requests is ignored. Returns whether a pending schedule was removed.
    pub fn cancel(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut state = shared.state.lock();
        let Some(slot) = state.timers.get_mut(&self.id) else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        let was_armed = slot.due.take().is_some();
        if was_armed {
            state.metrics.canceled = state.metrics.canceled.saturating_add(1);
        }
        was_armed
    }

    /// Disarm the timer and wait for an in-flight callback to return.
    ///
    /// The wait is skipped when called from the dispatcher thread, where it
    /// would deadlock. Returns whether a pending schedule was removed.
    pub fn cancel_sync(&self) -> bool {
        let was_armed = self.cancel();
        let Some(shared) = self.shared.upgrade() else {
            return was_armed;
        };
        if shared.is_dispatcher_thread() {
            return was_armed;
        }
        let mut state = shared.state.lock();
        while state.running == Some(self.id) && !state.shutdown {
            shared.idle.wait(&mut state);
        }
        was_armed
    }

    /// Whether the timer has a pending schedule.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.due().is_some()
    }

    /// Pending due time, if armed.
    #[must_use]
    pub fn due(&self) -> Option<Instant> {
        let shared = self.shared.upgrade()?;
        let state = shared.state.lock();
        state.timers.get(&self.id).and_then(|slot| slot.due)
    }

    /// Time left until the pending due time, if armed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.due()
            .map(|due| due.saturating_duration_since(Instant::now()))
    }

    /// Whether the callback is running right now.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.state.lock().running == Some(self.id))
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let removed = shared.state.lock().timers.remove(&self.id);
        drop(removed);
    }
}

impl core::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("armed", &self.is_armed())
            .finish()
    }
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        let next_due = state.heap.peek().map(|Reverse(entry)| entry.due);
        match next_due {
            None => {
                shared.wakeup.wait(&mut state);
                continue;
            }
            Some(due) if due > now => {
                shared.wakeup.wait_until(&mut state, due);
                continue;
            }
            Some(_) => {}
        }

        let Some(Reverse(entry)) = state.heap.pop() else {
            continue;
        };
        let Some(slot) = state.timers.get_mut(&entry.id) else {
            continue;
        };
        if slot.generation != entry.generation || slot.due != Some(entry.due) {
            state.metrics.stale_skipped = state.metrics.stale_skipped.saturating_add(1);
            continue;
        }
        slot.due = None;
        let Some(mut callback) = slot.callback.take() else {
            continue;
        };
        let fired_generation = slot.generation;

        state.running = Some(entry.id);
        let lateness = now.saturating_duration_since(entry.due);
        state
            .metrics
            .record_fire(u64::try_from(lateness.as_nanos()).unwrap_or(u64::MAX));

        let outcome = parking_lot::MutexGuard::unlocked(&mut state, || {
            catch_unwind(AssertUnwindSafe(|| callback()))
        });

        state.running = None;
        let action = match outcome {
            Ok(action) => action,
            Err(_) => {
                state.metrics.panicked = state.metrics.panicked.saturating_add(1);
                tracing::error!(timer = entry.id.as_u64(), "timer callback panicked");
                TimerAction::Stop
            }
        };

        if let Some(slot) = state.timers.get_mut(&entry.id) {
            slot.callback = Some(callback);
            if let TimerAction::Rearm(after) = action
                && slot.generation == fired_generation
                && slot.due.is_none()
            {
                let due = Instant::now() + after;
                slot.due = Some(due);
                state.push(entry.id, fired_generation, due);
                state.metrics.rearmed = state.metrics.rearmed.saturating_add(1);
            }
        } else {
            // Handle dropped while the callback ran.
            parking_lot::MutexGuard::unlocked(&mut state, || drop(callback));
        }
        shared.idle.notify_all();
    }
    drop(state);
    shared.idle.notify_all();
}
