//! Watchdog object header and reference-counted lifecycle.
//!
//! Both watchdog variants wrap an [`ObjectCore`]: the immutable identity of
//! the object, its logical reference count and a single per-object lock
//! guarding the slow fields. Handles are cheap `Arc` clones; the logical
//! count decides when the object is released, not the number of handles.
//!
//! Releasing an object cancels its timer, drops the attached context and
//! cancels any pending debug report. Every operation on a released object is
//! rejected with [`WatchdogError::InvalidState`] and logged as an assertion.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use hangwatch_eventlog::{EventLog, LogLevel, ThreadTag};
use hangwatch_report::{DebugReport, DebugReportPipeline, DeviceId};
use hangwatch_timer::TimerHandle;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::clock::{ExecutionClock, TimeBasis};
use crate::config::SubsystemConfig;
use crate::error::{WatchdogError, WatchdogResult};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Watchdog variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum WatchdogKind {
    /// Fires once a due time elapses without completion.
    Deadline = 0x5753_6457,
    /// Fires when no forward progress is observed across a period.
    Progress = 0x5744_6457,
}

impl WatchdogKind {
    /// Object type tag.
    #[must_use]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Convert from an object type tag.
    #[must_use]
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0x5753_6457 => Some(Self::Deadline),
            0x5744_6457 => Some(Self::Progress),
            _ => None,
        }
    }

    /// Get the kind as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deadline => "deadline",
            Self::Progress => "progress",
        }
    }
}

impl core::fmt::Display for WatchdogKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last event observed on a watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum WatchdogEvent {
    /// Nothing happened, or the work completed.
    #[default]
    None = 1,
    /// A deadline expired.
    Timeout = 2,
    /// A progress watchdog requested recovery.
    Recovery = 3,
}

impl WatchdogEvent {
    /// Raw value.
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }

    /// Convert from the raw value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::None),
            2 => Some(Self::Timeout),
            3 => Some(Self::Recovery),
            _ => None,
        }
    }
}

/// Services shared by every object of one subsystem.
pub(crate) struct Runtime {
    pub(crate) config: SubsystemConfig,
    pub(crate) log: Arc<EventLog>,
    pub(crate) pipeline: Arc<DebugReportPipeline>,
    pub(crate) clock: Arc<dyn ExecutionClock>,
    pub(crate) live: AtomicUsize,
}

impl Runtime {
    /// Reserve one live object slot.
    pub(crate) fn reserve_slot(&self, kind: WatchdogKind) -> WatchdogResult<()> {
        let max = self.config.max_objects;
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < max).then_some(live + 1)
            })
            .map(|_| ())
            .map_err(|live| {
                let pending = self.log.new_low_resource().with_parameters(&[
                    u64::from(kind.tag()),
                    u64::try_from(live).unwrap_or(u64::MAX),
                    u64::try_from(max).unwrap_or(u64::MAX),
                ]);
                self.log.commit(pending);
                tracing::warn!(%kind, live, max, "watchdog allocation refused");
                WatchdogError::resource_exhausted(format!(
                    "{live} live watchdogs, limit is {max}"
                ))
            })
    }

    fn release_slot(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Timer arming bookkeeping kept under the object lock.
#[derive(Debug, Default)]
pub(crate) struct Schedule {
    /// Due time of the current arm cycle.
    pub(crate) due: Option<Instant>,
    /// Number of arm cycles started.
    pub(crate) epoch: u64,
}

impl Schedule {
    /// Whether a timer firing at `now` belongs to the current arm cycle.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.due.is_some_and(|due| due <= now)
    }
}

/// Fields guarded by the per-object lock.
#[derive(Debug, Default)]
pub(crate) struct Locked<S> {
    pub(crate) last_event: WatchdogEvent,
    pub(crate) last_thread: Option<ThreadTag>,
    pub(crate) context: Option<Vec<u8>>,
    pub(crate) pending_report: Option<DebugReport>,
    pub(crate) schedule: Schedule,
    pub(crate) variant: S,
}

/// Header and lifecycle shared by both watchdog variants.
pub(crate) struct ObjectCore<S> {
    id: u64,
    kind: WatchdogKind,
    owner_tag: u64,
    device: DeviceId,
    time_basis: TimeBasis,
    ref_count: AtomicI32,
    released: AtomicBool,
    pub(crate) runtime: Arc<Runtime>,
    timer: OnceLock<TimerHandle>,
    state: Mutex<Locked<S>>,
}

impl<S: Default> ObjectCore<S> {
    /// Create an object holding one reference. The caller has reserved a slot.
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        kind: WatchdogKind,
        device: DeviceId,
        time_basis: TimeBasis,
        owner_tag: u64,
    ) -> Self {
        let id = NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(object = id, %kind, %device, owner_tag, "watchdog allocated");
        Self {
            id,
            kind,
            owner_tag,
            device,
            time_basis,
            ref_count: AtomicI32::new(1),
            released: AtomicBool::new(false),
            runtime,
            timer: OnceLock::new(),
            state: Mutex::new(Locked::default()),
        }
    }

    pub(crate) fn bind_timer(&self, timer: TimerHandle) {
        if self.timer.set(timer).is_err() {
            tracing::error!(object = self.id, "timer bound twice");
        }
    }

    /// Give back the slot of an object that never became visible.
    pub(crate) fn abandon(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.ref_count.store(0, Ordering::Release);
            self.runtime.release_slot();
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn kind(&self) -> WatchdogKind {
        self.kind
    }

    pub(crate) fn owner_tag(&self) -> u64 {
        self.owner_tag
    }

    pub(crate) fn device(&self) -> DeviceId {
        self.device
    }

    pub(crate) fn time_basis(&self) -> TimeBasis {
        self.time_basis
    }

    pub(crate) fn ref_count(&self) -> i32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Locked<S>> {
        self.state.lock()
    }

    /// Reject the operation if the object was released.
    #[track_caller]
    pub(crate) fn ensure_live(&self, operation: &'static str) -> WatchdogResult<()> {
        if self.is_released() {
            return Err(self.usage_error(operation, "released"));
        }
        Ok(())
    }

    /// Log a fatal usage error as an assertion entry and build the error.
    #[track_caller]
    pub(crate) fn usage_error(
        &self,
        operation: &'static str,
        state: impl core::fmt::Display,
    ) -> WatchdogError {
        let log = &self.runtime.log;
        let pending = log.new_assertion().with_parameters(&[
            u64::from(self.kind.tag()),
            self.owner_tag,
            self.id,
            self.device.as_u64(),
        ]);
        log.commit(pending);
        tracing::error!(
            object = self.id,
            kind = %self.kind,
            owner_tag = self.owner_tag,
            operation,
            %state,
            "watchdog usage error"
        );
        WatchdogError::invalid_state(operation, state)
    }

    /// Take one more logical reference.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the object was released.
    #[track_caller]
    pub(crate) fn reference(&self) -> WatchdogResult<()> {
        let mut current = self.ref_count.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return Err(self.usage_error("reference", "released"));
            }
            let Some(next) = current.checked_add(1) else {
                return Err(WatchdogError::resource_exhausted("reference count overflow"));
            };
            match self.ref_count.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop one logical reference. Returns `true` if this released the object.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidState`] if the object was already released.
    #[track_caller]
    pub(crate) fn dereference(&self) -> WatchdogResult<bool> {
        let mut current = self.ref_count.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return Err(self.usage_error("dereference", "released"));
            }
            match self.ref_count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if current == 1 {
            self.release();
            return Ok(true);
        }
        Ok(false)
    }

    /// Take a reference for a timer callback, unless the object is being released.
    pub(crate) fn try_hold(&self) -> Option<CallbackHold<'_, S>> {
        let mut current = self.ref_count.load(Ordering::Acquire);
        loop {
            if current <= 0 || self.is_released() {
                return None;
            }
            match self.ref_count.compare_exchange_weak(
                current,
                current.checked_add(1)?,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(CallbackHold { core: self }),
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
        let (context, report, variant) = {
            let mut locked = self.state.lock();
            if let Some(timer) = self.timer.get() {
                timer.cancel();
            }
            locked.schedule.due = None;
            (
                locked.context.take(),
                locked.pending_report.take(),
                mem::take(&mut locked.variant),
            )
        };
        if let Some(timer) = self.timer.get() {
            timer.cancel_sync();
        }
        drop(variant);
        drop(context);
        if let Some(report) = report {
            self.cancel_report(&report);
        }
        self.runtime.release_slot();
        tracing::debug!(
            object = self.id,
            kind = %self.kind,
            owner_tag = self.owner_tag,
            "watchdog released"
        );
    }

    fn cancel_report(&self, report: &DebugReport) {
        if !report.is_pending() {
            return;
        }
        if let Err(err) = self.runtime.pipeline.cancel(report) {
            tracing::warn!(object = self.id, error = %err, "pending report cancel failed");
        }
    }

    /// Arm the timer for `due`, starting a new arm cycle.
    pub(crate) fn arm(&self, schedule: &mut Schedule, due: Instant) -> WatchdogResult<()> {
        let Some(timer) = self.timer.get() else {
            return Err(WatchdogError::invalid_state("arm", "unbound"));
        };
        timer.schedule_at(due)?;
        schedule.due = Some(due);
        schedule.epoch = schedule.epoch.wrapping_add(1);
        Ok(())
    }

    /// Cancel the timer without waiting. A callback already dispatched sees
    /// the cleared schedule and does nothing.
    pub(crate) fn disarm(&self, schedule: &mut Schedule) {
        if let Some(timer) = self.timer.get() {
            timer.cancel();
        }
        schedule.due = None;
    }

    /// Whether the timer currently has a pending schedule.
    pub(crate) fn timer_armed(&self) -> bool {
        self.timer.get().is_some_and(TimerHandle::is_armed)
    }

    pub(crate) fn attach_context(&self, size: usize) -> WatchdogResult<()> {
        self.ensure_live("attach_context")?;
        let max = self.runtime.config.max_context_size;
        if size > max {
            return Err(WatchdogError::resource_exhausted(format!(
                "context of {size} bytes exceeds limit of {max}"
            )));
        }
        let mut locked = self.state.lock();
        if let Some(existing) = &locked.context {
            return Err(WatchdogError::AlreadyAttached {
                size: existing.len(),
            });
        }
        locked.context = Some(vec![0; size]);
        Ok(())
    }

    pub(crate) fn detach_context(&self) -> WatchdogResult<Vec<u8>> {
        self.ensure_live("detach_context")?;
        self.state
            .lock()
            .context
            .take()
            .ok_or(WatchdogError::NotAttached)
    }

    pub(crate) fn with_context<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> WatchdogResult<R> {
        self.ensure_live("with_context")?;
        let mut locked = self.state.lock();
        let context = locked.context.as_mut().ok_or(WatchdogError::NotAttached)?;
        Ok(f(context))
    }

    pub(crate) fn last_event(&self) -> WatchdogEvent {
        self.state.lock().last_event
    }

    pub(crate) fn last_signaling_thread(&self) -> Option<ThreadTag> {
        self.state.lock().last_thread
    }

    pub(crate) fn pending_report(&self) -> Option<DebugReport> {
        self.state.lock().pending_report.clone()
    }

    pub(crate) fn take_pending_report(&self) -> Option<DebugReport> {
        self.state.lock().pending_report.take()
    }

    /// Log the failure entry and capture a debug report for it.
    ///
    /// Capture is best-effort: failures are traced and the report, possibly
    /// without a dump, is still kept as the pending report.
    pub(crate) fn record_failure(&self, level: LogLevel, code: u32, args: [u64; 4]) {
        let log = &self.runtime.log;
        let [a0, a1, a2, a3] = args;
        match log.new_entry(level) {
            Ok(pending) => {
                log.commit(pending.with_parameters(&[u64::from(code), a0, a1, a2, a3]));
            }
            Err(err) => tracing::warn!(object = self.id, error = %err, "failure entry not logged"),
        }

        let previous = self.state.lock().pending_report.take();
        let (report, attached) =
            self.runtime
                .pipeline
                .capture(self.device, code, args, previous.as_ref());
        if let Err(err) = attached {
            tracing::warn!(
                object = self.id,
                report_id = %report.id(),
                error = %err,
                "diagnostic capture failed"
            );
        }
        if let Some(previous) = previous
            && !previous.same_report(&report)
        {
            self.cancel_report(&previous);
        }

        let mut locked = self.state.lock();
        if self.is_released() {
            drop(locked);
            self.cancel_report(&report);
        } else {
            locked.pending_report = Some(report);
        }
    }

    /// Complete the pending report once the recovery callback returned.
    pub(crate) fn finish_report(&self) {
        if !self.runtime.config.auto_complete_reports {
            return;
        }
        let Some(report) = self.take_pending_report() else {
            return;
        };
        if !report.is_pending() {
            return;
        }
        if let Err(err) = self.runtime.pipeline.complete(&report) {
            tracing::warn!(
                object = self.id,
                report_id = %report.id(),
                error = %err,
                "debug report completion failed"
            );
        }
    }
}

impl<S> Drop for ObjectCore<S> {
    fn drop(&mut self) {
        if *self.released.get_mut() {
            return;
        }
        tracing::warn!(
            object = self.id,
            kind = %self.kind,
            owner_tag = self.owner_tag,
            references = *self.ref_count.get_mut(),
            "watchdog dropped without being released"
        );
        if let Some(report) = self.state.get_mut().pending_report.take()
            && report.is_pending()
            && let Err(err) = self.runtime.pipeline.cancel(&report)
        {
            tracing::warn!(object = self.id, error = %err, "pending report cancel failed");
        }
        self.runtime.release_slot();
    }
}

/// Logical reference held by a running timer callback.
pub(crate) struct CallbackHold<'a, S: Default> {
    core: &'a ObjectCore<S>,
}

impl<S: Default> Drop for CallbackHold<'_, S> {
    fn drop(&mut self) {
        if self.core.ref_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.core.release();
        }
    }
}
