//! Deadline watchdog.
//!
//! A deadline watchdog fires once its due time elapses without the work
//! being completed or stopped.
//!
//! # State Transition Diagram
//!
//! ```text
//!              start()                 timer fires
//!   Idle ─────────────────► Armed ───────────────────► Expired
//!    ▲                      │  ▲                          │
//!    │  stop() / reset()    │  │ resume() / start()       │
//!    ├──────────────────────┘  │                          │
//!    │                   suspend() (suspend == start)     │
//!    │                      ▼  │                          │
//!    ├───────────────── Suspended                         │
//!    │                                                    │
//!    └────────────── stop() / reset() ────────────────────┘
//! ```
//!
//! Starts and suspends nest. The timer is armed exactly while
//! `start_count > suspend_count` outside the `Expired` state, and the time
//! spent suspended is excluded from the deadline.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use hangwatch_eventlog::ThreadTag;
use hangwatch_report::{DebugReport, DeviceId};
use hangwatch_timer::{TimerAction, TimerDispatcher};

use crate::clock::TimeBasis;
use crate::error::{WatchdogError, WatchdogResult};
use crate::object::{ObjectCore, WatchdogEvent, WatchdogKind};

/// Report code used for expired deadlines.
pub const DEADLINE_EXPIRED_CODE: u32 = 0x5753_0002;

/// Recovery callback of a deadline watchdog. Runs on the dispatcher thread.
pub type DeadlineCallback = Arc<dyn Fn(&DeadlineWatchdog) + Send + Sync>;

/// Deadline watchdog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeadlineState {
    /// Not started.
    #[default]
    Idle,
    /// Started, timer running.
    Armed,
    /// Every start is suspended, timer canceled.
    Suspended,
    /// The deadline elapsed; counters are frozen until stop or reset.
    Expired,
}

impl DeadlineState {
    /// Get the state as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
        }
    }
}

impl core::fmt::Display for DeadlineState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a deadline watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineStatus {
    /// Current state.
    pub state: DeadlineState,
    /// Nested starts.
    pub start_count: u32,
    /// Nested suspends.
    pub suspend_count: u32,
    /// Due time of the running deadline.
    pub due_time: Option<Instant>,
    /// Due time set by the first start of the cycle.
    pub initial_due_time: Option<Instant>,
    /// Budget left when the watchdog was suspended.
    pub remaining: Option<Duration>,
    /// Deadlines that expired.
    pub expirations: u64,
    /// Deadlines extended because the watched thread was starved.
    pub extensions: u64,
}

#[derive(Default)]
pub(crate) struct DeadlineFields {
    state: DeadlineState,
    start_count: u32,
    suspend_count: u32,
    cpu_snapshot: Option<Duration>,
    time_increment: Duration,
    due: Option<Instant>,
    initial_due: Option<Instant>,
    remaining: Option<Duration>,
    owner: Option<ThreadTag>,
    callback: Option<DeadlineCallback>,
    expirations: u64,
    extensions: u64,
}

impl DeadlineFields {
    /// Return to `Idle`, handing back the callback so it is dropped unlocked.
    fn clear(&mut self) -> Option<DeadlineCallback> {
        self.state = DeadlineState::Idle;
        self.start_count = 0;
        self.suspend_count = 0;
        self.cpu_snapshot = None;
        self.due = None;
        self.initial_due = None;
        self.remaining = None;
        self.owner = None;
        self.callback.take()
    }
}

struct Expiry {
    callback: Option<DeadlineCallback>,
    start_count: u32,
    budget: Duration,
}

/// Handle to a deadline watchdog.
///
/// Cloning the handle does not take a logical reference; use
/// [`DeadlineWatchdog::reference`] for that.
#[derive(Clone)]
pub struct DeadlineWatchdog {
    core: Arc<ObjectCore<DeadlineFields>>,
}

impl DeadlineWatchdog {
    pub(crate) fn bind(
        core: ObjectCore<DeadlineFields>,
        dispatcher: &TimerDispatcher,
    ) -> WatchdogResult<Self> {
        let core = Arc::new(core);
        let weak = Arc::downgrade(&core);
        match dispatcher.create_timer(move || on_expiry(&weak)) {
            Ok(timer) => {
                core.bind_timer(timer);
                Ok(Self { core })
            }
            Err(err) => {
                core.abandon();
                Err(err.into())
            }
        }
    }

    /// Start the deadline, or nest another start.
    ///
    /// The first start arms the timer for `due_time` from now and binds
    /// `callback` and the calling thread. Nested starts only count; a start
    /// while suspended re-arms with the remaining budget.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] on an expired or released
    /// watchdog, and [`WatchdogError::InvalidConfiguration`] for a zero due time.
    pub fn start<F>(&self, due_time: Duration, callback: F) -> WatchdogResult<()>
    where
        F: Fn(&DeadlineWatchdog) + Send + Sync + 'static,
    {
        self.core.ensure_live("start")?;
        if due_time.is_zero() {
            return Err(WatchdogError::invalid_configuration(
                "due time must be greater than 0",
            ));
        }
        let mut guard = self.core.lock();
        let locked = &mut *guard;
        let fields = &mut locked.variant;
        let now = Instant::now();

        match fields.state {
            DeadlineState::Expired => {
                return Err(WatchdogError::invalid_state("start", fields.state));
            }
            DeadlineState::Idle => {
                let due = now + due_time;
                self.core.arm(&mut locked.schedule, due)?;
                let owner = ThreadTag::current();
                fields.state = DeadlineState::Armed;
                fields.start_count = 1;
                fields.suspend_count = 0;
                fields.time_increment = due_time;
                fields.due = Some(due);
                fields.initial_due = Some(due);
                fields.remaining = None;
                fields.owner = Some(owner);
                fields.cpu_snapshot = self
                    .core
                    .runtime
                    .clock
                    .thread_time(owner, self.core.time_basis());
                fields.callback = Some(Arc::new(callback));
                tracing::debug!(
                    object = self.core.id(),
                    due_ms = due_time.as_millis(),
                    epoch = locked.schedule.epoch,
                    "deadline armed"
                );
            }
            DeadlineState::Armed => {
                fields.start_count = next_count(fields.start_count, "start")?;
            }
            DeadlineState::Suspended => {
                let start_count = next_count(fields.start_count, "start")?;
                let due = now + fields.remaining.unwrap_or(fields.time_increment);
                self.core.arm(&mut locked.schedule, due)?;
                fields.start_count = start_count;
                fields.due = Some(due);
                fields.remaining = None;
                fields.state = DeadlineState::Armed;
                tracing::debug!(object = self.core.id(), "deadline re-armed by nested start");
            }
        }
        Ok(())
    }

    /// Suspend the deadline. When every start is suspended the timer is
    /// canceled and the remaining budget recorded.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog is expired or
    /// already suspended as many times as it was started.
    pub fn suspend(&self) -> WatchdogResult<()> {
        self.core.ensure_live("suspend")?;
        let mut guard = self.core.lock();
        let locked = &mut *guard;
        let fields = &mut locked.variant;

        if fields.state == DeadlineState::Expired || fields.suspend_count >= fields.start_count {
            return Err(WatchdogError::invalid_state("suspend", fields.state));
        }
        fields.suspend_count += 1;
        if fields.suspend_count == fields.start_count {
            let now = Instant::now();
            fields.remaining = fields.due.map(|due| due.saturating_duration_since(now));
            fields.state = DeadlineState::Suspended;
            self.core.disarm(&mut locked.schedule);
            tracing::debug!(
                object = self.core.id(),
                remaining_ms = fields.remaining.map(|r| r.as_millis()),
                "deadline suspended"
            );
        }
        Ok(())
    }

    /// Lift one suspend (`incremental`) or all of them.
    ///
    /// When the watchdog leaves `Suspended` the timer re-arms with the
    /// remaining budget.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog is not suspended.
    pub fn resume(&self, incremental: bool) -> WatchdogResult<()> {
        self.core.ensure_live("resume")?;
        let mut guard = self.core.lock();
        let locked = &mut *guard;
        let fields = &mut locked.variant;

        if fields.suspend_count == 0 {
            return Err(WatchdogError::invalid_state("resume", fields.state));
        }
        let suspend_count = if incremental {
            fields.suspend_count - 1
        } else {
            0
        };
        if fields.state == DeadlineState::Suspended && suspend_count < fields.start_count {
            let remaining = fields.remaining.unwrap_or(fields.time_increment);
            let due = Instant::now() + remaining;
            self.core.arm(&mut locked.schedule, due)?;
            fields.due = Some(due);
            fields.remaining = None;
            fields.state = DeadlineState::Armed;
            tracing::debug!(
                object = self.core.id(),
                remaining_ms = remaining.as_millis(),
                "deadline resumed"
            );
        }
        fields.suspend_count = suspend_count;
        Ok(())
    }

    /// Stop the deadline.
    ///
    /// A full stop, or an incremental stop of the last start, cancels the
    /// timer and returns to `Idle` (also from `Expired`). Otherwise one start
    /// is removed and the deadline keeps running.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] on a released watchdog.
    pub fn stop(&self, incremental: bool) -> WatchdogResult<()> {
        self.core.ensure_live("stop")?;
        let callback = {
            let mut guard = self.core.lock();
            let locked = &mut *guard;
            let fields = &mut locked.variant;

            if fields.state == DeadlineState::Idle {
                return Ok(());
            }
            if !incremental || fields.start_count <= 1 {
                self.core.disarm(&mut locked.schedule);
                tracing::debug!(object = self.core.id(), from = %fields.state, "deadline stopped");
                fields.clear()
            } else {
                fields.start_count -= 1;
                fields.suspend_count = fields.suspend_count.min(fields.start_count);
                if fields.state == DeadlineState::Armed
                    && fields.suspend_count == fields.start_count
                {
                    let now = Instant::now();
                    fields.remaining = fields.due.map(|due| due.saturating_duration_since(now));
                    fields.state = DeadlineState::Suspended;
                    self.core.disarm(&mut locked.schedule);
                }
                None
            }
        };
        drop(callback);
        Ok(())
    }

    /// Mark the monitored work as done by `thread`, then stop incrementally.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] on a released watchdog.
    pub fn complete(&self, thread: ThreadTag) -> WatchdogResult<()> {
        self.core.ensure_live("complete")?;
        {
            let mut locked = self.core.lock();
            locked.last_event = WatchdogEvent::None;
            locked.last_thread = Some(thread);
        }
        self.stop(true)
    }

    /// Return to `Idle` unconditionally, canceling any pending timer.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] on a released watchdog.
    pub fn reset(&self) -> WatchdogResult<()> {
        self.core.ensure_live("reset")?;
        let callback = {
            let mut guard = self.core.lock();
            let locked = &mut *guard;
            self.core.disarm(&mut locked.schedule);
            locked.variant.clear()
        };
        drop(callback);
        tracing::debug!(object = self.core.id(), "deadline reset");
        Ok(())
    }

    /// Always [`WatchdogKind::Deadline`].
    #[must_use]
    pub fn kind(&self) -> WatchdogKind {
        self.core.kind()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DeadlineState {
        self.core.lock().variant.state
    }

    /// Snapshot of counters and due times.
    #[must_use]
    pub fn status(&self) -> DeadlineStatus {
        let locked = self.core.lock();
        let fields = &locked.variant;
        DeadlineStatus {
            state: fields.state,
            start_count: fields.start_count,
            suspend_count: fields.suspend_count,
            due_time: fields.due,
            initial_due_time: fields.initial_due,
            remaining: fields.remaining,
            expirations: fields.expirations,
            extensions: fields.extensions,
        }
    }

    /// Whether the timer has a pending schedule.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.core.timer_armed()
    }

    /// Thread that started the current cycle.
    #[must_use]
    pub fn owning_thread(&self) -> Option<ThreadTag> {
        self.core.lock().variant.owner
    }

    /// Take one more logical reference.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog was released.
    #[track_caller]
    pub fn reference(&self) -> WatchdogResult<()> {
        self.core.reference()
    }

    /// Drop one logical reference. Returns `true` if the watchdog was released.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog was already released.
    #[track_caller]
    pub fn dereference(&self) -> WatchdogResult<bool> {
        self.core.dereference()
    }

    /// Stop and drop the allocation reference.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog was already released.
    #[track_caller]
    pub fn free(&self) -> WatchdogResult<bool> {
        self.stop(false)?;
        self.core.dereference()
    }

    /// Current logical reference count.
    #[must_use]
    pub fn ref_count(&self) -> i32 {
        self.core.ref_count()
    }

    /// Whether the watchdog was released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.core.is_released()
    }

    /// Attach a zeroed context blob of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::AlreadyAttached`] if a blob is attached and
    /// [`WatchdogError::ResourceExhausted`] above the configured maximum.
    pub fn attach_context(&self, size: usize) -> WatchdogResult<()> {
        self.core.attach_context(size)
    }

    /// Detach and return the context blob.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::NotAttached`] if no blob is attached.
    pub fn detach_context(&self) -> WatchdogResult<Vec<u8>> {
        self.core.detach_context()
    }

    /// Run `f` on the attached context blob.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::NotAttached`] if no blob is attached.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> WatchdogResult<R> {
        self.core.with_context(f)
    }

    /// Last event observed.
    #[must_use]
    pub fn last_event(&self) -> WatchdogEvent {
        self.core.last_event()
    }

    /// Thread recorded by the last [`DeadlineWatchdog::complete`].
    #[must_use]
    pub fn last_signaling_thread(&self) -> Option<ThreadTag> {
        self.core.last_signaling_thread()
    }

    /// Owning device.
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.core.device()
    }

    /// Caller identifier given at allocation.
    #[must_use]
    pub fn owner_tag(&self) -> u64 {
        self.core.owner_tag()
    }

    /// Execution time basis used for the starvation check.
    #[must_use]
    pub fn time_basis(&self) -> TimeBasis {
        self.core.time_basis()
    }

    /// Report captured by the last expiry, while still pending.
    #[must_use]
    pub fn pending_report(&self) -> Option<DebugReport> {
        self.core.pending_report()
    }

    /// Take ownership of the pending report.
    pub fn take_pending_report(&self) -> Option<DebugReport> {
        self.core.take_pending_report()
    }

    pub(crate) fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl core::fmt::Debug for DeadlineWatchdog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeadlineWatchdog")
            .field("id", &self.core.id())
            .field("device", &self.core.device())
            .field("owner_tag", &self.core.owner_tag())
            .field("ref_count", &self.core.ref_count())
            .finish_non_exhaustive()
    }
}

fn next_count(count: u32, operation: &'static str) -> WatchdogResult<u32> {
    count
        .checked_add(1)
        .ok_or_else(|| WatchdogError::resource_exhausted(format!("{operation} count overflow")))
}

fn on_expiry(weak: &Weak<ObjectCore<DeadlineFields>>) -> TimerAction {
    let Some(core) = weak.upgrade() else {
        return TimerAction::Stop;
    };
    let Some(hold) = core.try_hold() else {
        return TimerAction::Stop;
    };
    let now = Instant::now();

    let expiry = {
        let mut guard = core.lock();
        let locked = &mut *guard;
        let fields = &mut locked.variant;
        if fields.state != DeadlineState::Armed || !locked.schedule.is_due(now) {
            return TimerAction::Stop;
        }

        if let Some(owner) = fields.owner {
            let consumed = core.runtime.clock.thread_time(owner, core.time_basis());
            if let (Some(consumed), Some(previous)) = (consumed, fields.cpu_snapshot)
                && consumed <= previous
            {
                let due = now + fields.time_increment;
                locked.schedule.due = Some(due);
                fields.due = Some(due);
                fields.extensions += 1;
                tracing::debug!(
                    object = core.id(),
                    %owner,
                    "watched thread starved, deadline extended"
                );
                return TimerAction::Rearm(fields.time_increment);
            }
            fields.cpu_snapshot = consumed;
        }

        locked.schedule.due = None;
        fields.state = DeadlineState::Expired;
        fields.expirations += 1;
        locked.last_event = WatchdogEvent::Timeout;
        Expiry {
            callback: fields.callback.clone(),
            start_count: fields.start_count,
            budget: fields.time_increment,
        }
    };

    let budget_ms = u64::try_from(expiry.budget.as_millis()).unwrap_or(u64::MAX);
    tracing::warn!(
        object = core.id(),
        device = %core.device(),
        owner_tag = core.owner_tag(),
        budget_ms,
        "deadline expired"
    );
    core.record_failure(
        core.runtime.config.deadline_severity.level(),
        DEADLINE_EXPIRED_CODE,
        [
            core.owner_tag(),
            core.device().as_u64(),
            u64::from(expiry.start_count),
            budget_ms,
        ],
    );
    if let Some(callback) = expiry.callback {
        let handle = DeadlineWatchdog {
            core: Arc::clone(&core),
        };
        callback(&handle);
    }
    core.finish_report();
    drop(hold);
    TimerAction::Stop
}
