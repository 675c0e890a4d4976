//! Debugger presence probing and break-on-event hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::entry::LogEntry;
use crate::level::LogLevel;

/// Debug behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebugFlag {
    /// Break into the debugger when an assertion entry is committed.
    BreakOnAssertion,
    /// Break into the debugger when an error entry is committed.
    BreakOnError,
}

/// Set of enabled [`DebugFlag`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DebugFlags {
    /// See [`DebugFlag::BreakOnAssertion`].
    #[serde(default)]
    pub break_on_assertion: bool,
    /// See [`DebugFlag::BreakOnError`].
    #[serde(default)]
    pub break_on_error: bool,
}

impl DebugFlags {
    /// Whether `flag` is enabled.
    #[must_use]
    pub const fn contains(self, flag: DebugFlag) -> bool {
        match flag {
            DebugFlag::BreakOnAssertion => self.break_on_assertion,
            DebugFlag::BreakOnError => self.break_on_error,
        }
    }

    /// Whether committing an entry at `level` should break.
    #[must_use]
    pub const fn breaks_on(self, level: LogLevel) -> bool {
        match level {
            LogLevel::Assertion => self.break_on_assertion,
            LogLevel::CriticalError | LogLevel::Error => self.break_on_error,
            _ => false,
        }
    }
}

/// Injected debugger integration.
///
/// Production code registers an implementation that talks to a real
/// debugger; tests register a recording hook or [`NoDebugger`].
pub trait DebuggerHook: Send + Sync {
    /// Whether a debugger is attached right now.
    fn is_present(&self) -> bool;

    /// Called after an entry that requests a break was committed.
    ///
    /// Runs on the committing thread, which may be the timer dispatcher, so
    /// it must not block.
    fn on_break(&self, entry: &LogEntry);
}

/// Hook for environments without a debugger.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDebugger;

impl DebuggerHook for NoDebugger {
    fn is_present(&self) -> bool {
        false
    }

    fn on_break(&self, _entry: &LogEntry) {}
}

/// Caches debugger presence and applies the configured debug flags.
pub struct DebuggerProbe {
    hook: Arc<dyn DebuggerHook>,
    flags: DebugFlags,
    probed: AtomicBool,
    present: AtomicBool,
}

impl DebuggerProbe {
    /// Create a probe over `hook`.
    #[must_use]
    pub fn new(hook: Arc<dyn DebuggerHook>, flags: DebugFlags) -> Self {
        Self {
            hook,
            flags,
            probed: AtomicBool::new(false),
            present: AtomicBool::new(false),
        }
    }

    /// Whether a debugger is present.
    ///
    /// The first call, and any call with `refresh`, asks the hook; other
    /// calls return the cached answer.
    pub fn is_present(&self, refresh: bool) -> bool {
        if refresh || !self.probed.load(Ordering::Acquire) {
            let present = self.hook.is_present();
            self.present.store(present, Ordering::Release);
            self.probed.store(true, Ordering::Release);
        }
        self.present.load(Ordering::Acquire)
    }

    /// Whether `flag` is enabled.
    #[must_use]
    pub fn query_flag(&self, flag: DebugFlag) -> bool {
        self.flags.contains(flag)
    }

    /// Configured flags.
    #[must_use]
    pub fn flags(&self) -> DebugFlags {
        self.flags
    }

    /// Invoke the break hook for `entry` if its level and the flags request it.
    pub(crate) fn maybe_break(&self, entry: &LogEntry) -> bool {
        if self.flags.breaks_on(entry.level()) && self.is_present(false) {
            tracing::debug!(
                event_order = entry.event_order(),
                level = %entry.level(),
                "breaking into debugger"
            );
            self.hook.on_break(entry);
            true
        } else {
            false
        }
    }
}

impl Default for DebuggerProbe {
    fn default() -> Self {
        Self::new(Arc::new(NoDebugger), DebugFlags::default())
    }
}

impl core::fmt::Debug for DebuggerProbe {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DebuggerProbe")
            .field("flags", &self.flags)
            .field("present", &self.present.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
