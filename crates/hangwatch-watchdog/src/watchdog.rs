//! Either-variant watchdog handle.
//!
//! Client code that does not care which detection strategy an object uses
//! holds a [`Watchdog`]; shared operations dispatch on the variant.

use hangwatch_eventlog::ThreadTag;
use hangwatch_report::{DebugReport, DeviceId};

use crate::clock::TimeBasis;
use crate::deadline::DeadlineWatchdog;
use crate::error::WatchdogResult;
use crate::object::{WatchdogEvent, WatchdogKind};
use crate::progress::ProgressWatchdog;

/// A deadline or progress watchdog.
#[derive(Debug, Clone)]
pub enum Watchdog {
    /// Deadline variant.
    Deadline(DeadlineWatchdog),
    /// Progress variant.
    Progress(ProgressWatchdog),
}

macro_rules! dispatch {
    ($self:expr, $watchdog:ident => $body:expr) => {
        match $self {
            Watchdog::Deadline($watchdog) => $body,
            Watchdog::Progress($watchdog) => $body,
        }
    };
}

impl Watchdog {
    /// Variant of this watchdog.
    #[must_use]
    pub fn kind(&self) -> WatchdogKind {
        dispatch!(self, w => w.kind())
    }

    /// Deadline handle, if this is a deadline watchdog.
    #[must_use]
    pub fn as_deadline(&self) -> Option<&DeadlineWatchdog> {
        match self {
            Self::Deadline(w) => Some(w),
            Self::Progress(_) => None,
        }
    }

    /// Progress handle, if this is a progress watchdog.
    #[must_use]
    pub fn as_progress(&self) -> Option<&ProgressWatchdog> {
        match self {
            Self::Progress(w) => Some(w),
            Self::Deadline(_) => None,
        }
    }

    /// Take one more logical reference.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::InvalidState`] if the watchdog was released.
    #[track_caller]
    pub fn reference(&self) -> WatchdogResult<()> {
        dispatch!(self, w => w.reference())
    }

    /// Drop one logical reference. Returns `true` if the watchdog was released.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::InvalidState`] if the watchdog was already released.
    #[track_caller]
    pub fn dereference(&self) -> WatchdogResult<bool> {
        dispatch!(self, w => w.dereference())
    }

    /// Stop and drop the allocation reference.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::InvalidState`] if the watchdog was already released.
    #[track_caller]
    pub fn free(&self) -> WatchdogResult<bool> {
        dispatch!(self, w => w.free())
    }

    /// Stop the watchdog. Deadline watchdogs stop fully.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::InvalidState`] on a released watchdog.
    pub fn stop(&self) -> WatchdogResult<()> {
        match self {
            Self::Deadline(w) => w.stop(false),
            Self::Progress(w) => w.stop(),
        }
    }

    /// Suspend the watchdog.
    ///
    /// # Errors
    ///
    /// See [`DeadlineWatchdog::suspend`] and [`ProgressWatchdog::suspend`].
    pub fn suspend(&self) -> WatchdogResult<()> {
        dispatch!(self, w => w.suspend())
    }

    /// Resume the watchdog.
    ///
    /// # Errors
    ///
    /// See [`DeadlineWatchdog::resume`] and [`ProgressWatchdog::resume`].
    pub fn resume(&self, incremental: bool) -> WatchdogResult<()> {
        dispatch!(self, w => w.resume(incremental))
    }

    /// Reset the watchdog.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::InvalidState`] on a released watchdog.
    pub fn reset(&self) -> WatchdogResult<()> {
        dispatch!(self, w => w.reset())
    }

    /// Attach a zeroed context blob.
    ///
    /// # Errors
    ///
    /// See [`DeadlineWatchdog::attach_context`].
    pub fn attach_context(&self, size: usize) -> WatchdogResult<()> {
        dispatch!(self, w => w.attach_context(size))
    }

    /// Detach and return the context blob.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::NotAttached`] if no blob is attached.
    pub fn detach_context(&self) -> WatchdogResult<Vec<u8>> {
        dispatch!(self, w => w.detach_context())
    }

    /// Last event observed.
    #[must_use]
    pub fn last_event(&self) -> WatchdogEvent {
        dispatch!(self, w => w.last_event())
    }

    /// Last signaling thread.
    #[must_use]
    pub fn last_signaling_thread(&self) -> Option<ThreadTag> {
        dispatch!(self, w => w.last_signaling_thread())
    }

    /// Owning device.
    #[must_use]
    pub fn device(&self) -> DeviceId {
        dispatch!(self, w => w.device())
    }

    /// Caller identifier given at allocation.
    #[must_use]
    pub fn owner_tag(&self) -> u64 {
        dispatch!(self, w => w.owner_tag())
    }

    /// Execution time basis.
    #[must_use]
    pub fn time_basis(&self) -> TimeBasis {
        dispatch!(self, w => w.time_basis())
    }

    /// Current logical reference count.
    #[must_use]
    pub fn ref_count(&self) -> i32 {
        dispatch!(self, w => w.ref_count())
    }

    /// Whether the watchdog was released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        dispatch!(self, w => w.is_released())
    }

    /// Whether the timer has a pending schedule.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        dispatch!(self, w => w.is_armed())
    }

    /// Report captured by the last failure, while still pending.
    #[must_use]
    pub fn pending_report(&self) -> Option<DebugReport> {
        dispatch!(self, w => w.pending_report())
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Deadline(a), Self::Deadline(b)) => a.same_object(b),
            (Self::Progress(a), Self::Progress(b)) => a.same_object(b),
            _ => false,
        }
    }
}

impl From<DeadlineWatchdog> for Watchdog {
    fn from(watchdog: DeadlineWatchdog) -> Self {
        Self::Deadline(watchdog)
    }
}

impl From<ProgressWatchdog> for Watchdog {
    fn from(watchdog: ProgressWatchdog) -> Self {
        Self::Progress(watchdog)
    }
}
