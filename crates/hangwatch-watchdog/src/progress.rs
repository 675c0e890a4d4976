//! Progress watchdog.
//!
//! Workers bracket units of work with [`ProgressWatchdog::enter_monitored_section`]
//! and [`ProgressWatchdog::exit_monitored_section`]. A periodic tick compares
//! the section counters against the previous period boundary; after
//! `miss_threshold` consecutive periods without any change the watchdog
//! triggers recovery. Long-running work that keeps entering and leaving
//! sections never triggers.
//!
//! Entering and leaving a section never takes the object lock. A section may
//! be left on a different thread than the one that entered it; the open
//! section table only exists to reject nested entry on a non-reentrant
//! watchdog.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use hangwatch_eventlog::ThreadTag;
use hangwatch_report::{DebugReport, DeviceId};
use hangwatch_timer::{TimerAction, TimerDispatcher};
use parking_lot::Mutex;

use crate::clock::TimeBasis;
use crate::error::{WatchdogError, WatchdogResult};
use crate::object::{ObjectCore, WatchdogEvent, WatchdogKind};

/// Report code used when a progress watchdog triggers.
pub const PROGRESS_STALLED_CODE: u32 = 0x5744_0003;

/// Recovery callback of a progress watchdog. Runs on the dispatcher thread.
pub type ProgressCallback = Arc<dyn Fn(&ProgressWatchdog) + Send + Sync>;

/// Progress watchdog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProgressState {
    /// Not started.
    #[default]
    Idle,
    /// Ticking.
    Armed,
    /// A tick is evaluating the counters.
    Checking,
    /// Recovery was requested; ticking stops until reset.
    Triggered,
    /// Ticking paused by suspend.
    Suspended,
}

impl ProgressState {
    /// Get the state as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Checking => "checking",
            Self::Triggered => "triggered",
            Self::Suspended => "suspended",
        }
    }
}

impl core::fmt::Display for ProgressState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a progress watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStatus {
    /// Current state.
    pub state: ProgressState,
    /// Tick period.
    pub period: Duration,
    /// Nested suspends.
    pub suspend_count: u32,
    /// Sections entered.
    pub in_count: u64,
    /// Sections left.
    pub in_count_complete: u64,
    /// Copy of `in_count_complete` taken at the last period boundary.
    pub out_count: u64,
    /// Consecutive periods without progress.
    pub misses: u32,
    /// Ticks evaluated.
    pub ticks: u64,
    /// Recoveries requested.
    pub triggers: u64,
}

#[derive(Default)]
pub(crate) struct ProgressFields {
    state: ProgressState,
    period: Duration,
    suspend_count: u32,
    out_count: u64,
    last_in: u64,
    last_out: u64,
    trigger: u32,
    owner: Option<ThreadTag>,
    callback: Option<ProgressCallback>,
    ticks: u64,
    triggers: u64,
}

pub(crate) struct ProgressInner {
    core: ObjectCore<ProgressFields>,
    in_count: AtomicU64,
    in_count_complete: AtomicU64,
    made_progress: AtomicBool,
    reentrant: bool,
    /// Open sections per entering thread.
    open_sections: Mutex<HashMap<ThreadTag, u32>>,
}

impl ProgressInner {
    /// Read `(in, complete)` so that `complete <= in` holds.
    fn counts(&self) -> (u64, u64) {
        let complete = self.in_count_complete.load(Ordering::Acquire);
        let entered = self.in_count.load(Ordering::Acquire);
        (entered, complete)
    }

    fn snapshot(&self, fields: &mut ProgressFields) {
        let (entered, complete) = self.counts();
        fields.last_in = entered;
        fields.last_out = complete;
        fields.out_count = complete;
        fields.trigger = 0;
        self.made_progress.store(true, Ordering::Release);
    }
}

struct Trigger {
    callback: Option<ProgressCallback>,
    entered: u64,
    complete: u64,
    misses: u32,
}

/// Handle to a progress watchdog.
///
/// Cloning the handle does not take a logical reference; use
/// [`ProgressWatchdog::reference`] for that.
#[derive(Clone)]
pub struct ProgressWatchdog {
    inner: Arc<ProgressInner>,
}

impl ProgressWatchdog {
    pub(crate) fn bind(
        core: ObjectCore<ProgressFields>,
        reentrant: bool,
        dispatcher: &TimerDispatcher,
    ) -> WatchdogResult<Self> {
        let inner = Arc::new(ProgressInner {
            core,
            in_count: AtomicU64::new(0),
            in_count_complete: AtomicU64::new(0),
            made_progress: AtomicBool::new(true),
            reentrant,
            open_sections: Mutex::default(),
        });
        let weak = Arc::downgrade(&inner);
        match dispatcher.create_timer(move || on_tick(&weak)) {
            Ok(timer) => {
                inner.core.bind_timer(timer);
                Ok(Self { inner })
            }
            Err(err) => {
                inner.core.abandon();
                Err(err.into())
            }
        }
    }

    fn core(&self) -> &ObjectCore<ProgressFields> {
        &self.inner.core
    }

    /// Start ticking every `period`.
    ///
    /// The current section counters become the first snapshot, so work done
    /// before the start is not counted as progress.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] unless the watchdog is idle,
    /// and [`WatchdogError::InvalidConfiguration`] for a zero period.
    pub fn start<F>(&self, period: Duration, callback: F) -> WatchdogResult<()>
    where
        F: Fn(&ProgressWatchdog) + Send + Sync + 'static,
    {
        self.core().ensure_live("start")?;
        if period.is_zero() {
            return Err(WatchdogError::invalid_configuration(
                "period must be greater than 0",
            ));
        }
        let mut guard = self.core().lock();
        let locked = &mut *guard;
        let fields = &mut locked.variant;
        if fields.state != ProgressState::Idle {
            return Err(WatchdogError::invalid_state("start", fields.state));
        }

        self.core().arm(&mut locked.schedule, Instant::now() + period)?;
        self.inner.snapshot(fields);
        fields.state = ProgressState::Armed;
        fields.period = period;
        fields.suspend_count = 0;
        fields.owner = Some(ThreadTag::current());
        fields.callback = Some(Arc::new(callback));
        tracing::debug!(
            object = self.core().id(),
            period_ms = period.as_millis(),
            "progress watchdog started"
        );
        Ok(())
    }

    /// Cancel the tick and return to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] on a released watchdog.
    pub fn stop(&self) -> WatchdogResult<()> {
        self.core().ensure_live("stop")?;
        let callback = {
            let mut guard = self.core().lock();
            let locked = &mut *guard;
            let fields = &mut locked.variant;
            if fields.state == ProgressState::Idle {
                return Ok(());
            }
            self.core().disarm(&mut locked.schedule);
            tracing::debug!(
                object = self.core().id(),
                from = %fields.state,
                "progress watchdog stopped"
            );
            fields.state = ProgressState::Idle;
            fields.suspend_count = 0;
            fields.trigger = 0;
            fields.owner = None;
            fields.callback.take()
        };
        drop(callback);
        Ok(())
    }

    /// Pause ticking. Suspends nest.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog is idle.
    pub fn suspend(&self) -> WatchdogResult<()> {
        self.core().ensure_live("suspend")?;
        let mut guard = self.core().lock();
        let locked = &mut *guard;
        let fields = &mut locked.variant;
        if fields.state == ProgressState::Idle {
            return Err(WatchdogError::invalid_state("suspend", fields.state));
        }
        fields.suspend_count = fields
            .suspend_count
            .checked_add(1)
            .ok_or_else(|| WatchdogError::resource_exhausted("suspend count overflow"))?;
        if fields.state == ProgressState::Armed {
            self.core().disarm(&mut locked.schedule);
            fields.state = ProgressState::Suspended;
            tracing::debug!(object = self.core().id(), "progress watchdog suspended");
        }
        Ok(())
    }

    /// Lift one suspend (`incremental`) or all of them.
    ///
    /// Leaving `Suspended` re-snapshots the counters, so the suspended time
    /// never counts as a missed period.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog is not suspended.
    pub fn resume(&self, incremental: bool) -> WatchdogResult<()> {
        self.core().ensure_live("resume")?;
        let mut guard = self.core().lock();
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
        if suspend_count == 0 && fields.state == ProgressState::Suspended {
            self.core().arm(&mut locked.schedule, Instant::now() + fields.period)?;
            self.inner.snapshot(fields);
            fields.state = ProgressState::Armed;
            tracing::debug!(object = self.core().id(), "progress watchdog resumed");
        }
        fields.suspend_count = suspend_count;
        Ok(())
    }

    /// Clear the miss counter and re-snapshot.
    ///
    /// A started watchdog, including a triggered one, ticks again unless it
    /// is suspended. An idle watchdog stays idle.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] on a released watchdog.
    pub fn reset(&self) -> WatchdogResult<()> {
        self.core().ensure_live("reset")?;
        let mut guard = self.core().lock();
        let locked = &mut *guard;
        let fields = &mut locked.variant;
        self.inner.snapshot(fields);
        match fields.state {
            ProgressState::Idle => {}
            _ if fields.suspend_count > 0 => {
                self.core().disarm(&mut locked.schedule);
                fields.state = ProgressState::Suspended;
            }
            _ => {
                self.core().arm(&mut locked.schedule, Instant::now() + fields.period)?;
                fields.state = ProgressState::Armed;
            }
        }
        tracing::debug!(
            object = self.core().id(),
            state = %fields.state,
            "progress watchdog reset"
        );
        Ok(())
    }

    /// Record entry into a monitored section.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] on a released watchdog, or when
    /// a non-reentrant watchdog is entered again on the same thread before
    /// that entry was left. Both are logged as assertions.
    #[track_caller]
    pub fn enter_monitored_section(&self) -> WatchdogResult<()> {
        self.core().ensure_live("enter_monitored_section")?;
        let caller = ThreadTag::current();
        {
            let mut open = self.inner.open_sections.lock();
            let depth = open.entry(caller).or_insert(0);
            if *depth == 0 || self.inner.reentrant {
                *depth = depth.saturating_add(1);
                self.inner.in_count.fetch_add(1, Ordering::AcqRel);
                return Ok(());
            }
        }
        Err(self
            .core()
            .usage_error("enter_monitored_section", "already entered on this thread"))
    }

    /// Record exit from a monitored section.
    ///
    /// The caller's own open section is closed first. Otherwise the exit
    /// completes a section entered on another thread, which clears that
    /// thread's entry.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] on a released watchdog, or when
    /// no section is open on any thread. Both are logged as assertions.
    #[track_caller]
    pub fn exit_monitored_section(&self) -> WatchdogResult<()> {
        self.core().ensure_live("exit_monitored_section")?;
        let caller = ThreadTag::current();
        {
            let mut open = self.inner.open_sections.lock();
            let owner = if open.contains_key(&caller) {
                Some(caller)
            } else {
                open.keys().next().copied()
            };
            if let Some(owner) = owner
                && let Some(depth) = open.get_mut(&owner)
            {
                *depth = depth.saturating_sub(1);
                if *depth == 0 {
                    open.remove(&owner);
                }
                self.inner.in_count_complete.fetch_add(1, Ordering::AcqRel);
                return Ok(());
            }
        }
        Err(self
            .core()
            .usage_error("exit_monitored_section", "no monitored section is open"))
    }

    /// Run `work` inside a monitored section.
    ///
    /// # Errors
    ///
    /// Returns the error of entering or leaving the section.
    #[track_caller]
    pub fn monitored<R>(&self, work: impl FnOnce() -> R) -> WatchdogResult<R> {
        self.enter_monitored_section()?;
        let result = work();
        self.exit_monitored_section()?;
        Ok(result)
    }

    /// Whether the most recent period boundary observed progress.
    ///
    /// `true` before the first boundary. Lock-free.
    #[must_use]
    pub fn made_any_progress(&self) -> bool {
        self.inner.made_progress.load(Ordering::Acquire)
    }

    /// Always [`WatchdogKind::Progress`].
    #[must_use]
    pub fn kind(&self) -> WatchdogKind {
        self.core().kind()
    }

    /// Whether nested entry on one thread is allowed.
    #[must_use]
    pub fn is_reentrant(&self) -> bool {
        self.inner.reentrant
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ProgressState {
        self.core().lock().variant.state
    }

    /// Snapshot of counters.
    #[must_use]
    pub fn status(&self) -> ProgressStatus {
        let (entered, complete) = self.inner.counts();
        let locked = self.core().lock();
        let fields = &locked.variant;
        ProgressStatus {
            state: fields.state,
            period: fields.period,
            suspend_count: fields.suspend_count,
            in_count: entered,
            in_count_complete: complete,
            out_count: fields.out_count,
            misses: fields.trigger,
            ticks: fields.ticks,
            triggers: fields.triggers,
        }
    }

    /// Whether the tick timer has a pending schedule.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.core().timer_armed()
    }

    /// Thread that started the watchdog.
    #[must_use]
    pub fn owning_thread(&self) -> Option<ThreadTag> {
        self.core().lock().variant.owner
    }

    /// Take one more logical reference.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog was released.
    #[track_caller]
    pub fn reference(&self) -> WatchdogResult<()> {
        self.core().reference()
    }

    /// Drop one logical reference. Returns `true` if the watchdog was released.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog was already released.
    #[track_caller]
    pub fn dereference(&self) -> WatchdogResult<bool> {
        self.core().dereference()
    }

    /// Stop and drop the allocation reference.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the watchdog was already released.
    #[track_caller]
    pub fn free(&self) -> WatchdogResult<bool> {
        self.stop()?;
        self.core().dereference()
    }

    /// Current logical reference count.
    #[must_use]
    pub fn ref_count(&self) -> i32 {
        self.core().ref_count()
    }

    /// Whether the watchdog was released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.core().is_released()
    }

    /// Attach a zeroed context blob of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::AlreadyAttached`] if a blob is attached and
    /// [`WatchdogError::ResourceExhausted`] above the configured maximum.
    pub fn attach_context(&self, size: usize) -> WatchdogResult<()> {
        self.core().attach_context(size)
    }

    /// Detach and return the context blob.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::NotAttached`] if no blob is attached.
    pub fn detach_context(&self) -> WatchdogResult<Vec<u8>> {
        self.core().detach_context()
    }

    /// Run `f` on the attached context blob.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::NotAttached`] if no blob is attached.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> WatchdogResult<R> {
        self.core().with_context(f)
    }

    /// Last event observed.
    #[must_use]
    pub fn last_event(&self) -> WatchdogEvent {
        self.core().last_event()
    }

    /// Last signaling thread.
    #[must_use]
    pub fn last_signaling_thread(&self) -> Option<ThreadTag> {
        self.core().last_signaling_thread()
    }

    /// Owning device.
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.core().device()
    }

    /// Caller identifier given at allocation.
    #[must_use]
    pub fn owner_tag(&self) -> u64 {
        self.core().owner_tag()
    }

    /// Execution time basis.
    #[must_use]
    pub fn time_basis(&self) -> TimeBasis {
        self.core().time_basis()
    }

    /// Report captured by the last trigger, while still pending.
    #[must_use]
    pub fn pending_report(&self) -> Option<DebugReport> {
        self.core().pending_report()
    }

    /// Take ownership of the pending report.
    pub fn take_pending_report(&self) -> Option<DebugReport> {
        self.core().take_pending_report()
    }

    pub(crate) fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl core::fmt::Debug for ProgressWatchdog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressWatchdog")
            .field("id", &self.core().id())
            .field("device", &self.core().device())
            .field("owner_tag", &self.core().owner_tag())
            .field("reentrant", &self.inner.reentrant)
            .field("ref_count", &self.core().ref_count())
            .finish_non_exhaustive()
    }
}

fn on_tick(weak: &Weak<ProgressInner>) -> TimerAction {
    let Some(inner) = weak.upgrade() else {
        return TimerAction::Stop;
    };
    let core = &inner.core;
    let Some(hold) = core.try_hold() else {
        return TimerAction::Stop;
    };
    let now = Instant::now();
    let threshold = core.runtime.config.miss_threshold;

    let trigger = {
        let mut guard = core.lock();
        let locked = &mut *guard;
        let fields = &mut locked.variant;
        if fields.state != ProgressState::Armed || !locked.schedule.is_due(now) {
            return TimerAction::Stop;
        }
        fields.state = ProgressState::Checking;
        fields.ticks += 1;

        let (entered, complete) = inner.counts();
        fields.out_count = complete;
        let progressed = (entered, fields.out_count) != (fields.last_in, fields.last_out);
        inner.made_progress.store(progressed, Ordering::Release);

        if progressed {
            fields.trigger = 0;
            fields.last_in = entered;
            fields.last_out = fields.out_count;
        } else {
            fields.trigger = fields.trigger.saturating_add(1);
        }

        if progressed || fields.trigger < threshold {
            fields.state = ProgressState::Armed;
            locked.schedule.due = Some(now + fields.period);
            if !progressed {
                tracing::debug!(
                    object = core.id(),
                    misses = fields.trigger,
                    threshold,
                    "no progress this period"
                );
            }
            return TimerAction::Rearm(fields.period);
        }

        locked.schedule.due = None;
        fields.state = ProgressState::Triggered;
        fields.triggers += 1;
        locked.last_event = WatchdogEvent::Recovery;
        Trigger {
            callback: fields.callback.clone(),
            entered,
            complete,
            misses: fields.trigger,
        }
    };

    tracing::warn!(
        object = core.id(),
        device = %core.device(),
        owner_tag = core.owner_tag(),
        misses = trigger.misses,
        in_count = trigger.entered,
        "no progress, requesting recovery"
    );
    core.record_failure(
        core.runtime.config.progress_severity.level(),
        PROGRESS_STALLED_CODE,
        [
            core.owner_tag(),
            core.device().as_u64(),
            trigger.entered,
            trigger.complete,
        ],
    );
    if let Some(callback) = trigger.callback {
        let handle = ProgressWatchdog {
            inner: Arc::clone(&inner),
        };
        callback(&handle);
    }
    core.finish_report();
    drop(hold);
    TimerAction::Stop
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ProgressState::Triggered.to_string(), "triggered");
        assert_eq!(ProgressState::default(), ProgressState::Idle);
    }
}
