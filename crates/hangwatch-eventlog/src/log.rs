//! The event log ring.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::debugger::{DebugFlags, DebuggerHook, DebuggerProbe, NoDebugger};
use crate::entry::{CallSite, LogEntry, PendingEntry, RECORD_SIZE};
use crate::error::{EventLogError, EventLogResult};
use crate::level::LogLevel;

/// Process-wide event order. Shared by every [`EventLog`] so orders are
/// unique across logs and never reused.
static EVENT_ORDER: AtomicU64 = AtomicU64::new(0);

/// Most recently assigned event order (0 before the first entry).
#[must_use]
pub fn current_event_order() -> u64 {
    EVENT_ORDER.load(Ordering::Acquire)
}

fn next_event_order() -> u64 {
    EVENT_ORDER.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
}

/// Upper bound on the ring capacity.
pub const MAX_CAPACITY: usize = 1 << 20;

/// Event log configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogConfig {
    /// Number of committed entries retained. Older entries are dropped.
    pub capacity: usize,
    /// Debugger break behaviour.
    #[serde(default)]
    pub debug_flags: DebugFlags,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            debug_flags: DebugFlags::default(),
        }
    }
}

impl EventLogConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity is zero or above [`MAX_CAPACITY`].
    pub fn validate(&self) -> EventLogResult<()> {
        if self.capacity == 0 || self.capacity > MAX_CAPACITY {
            return Err(EventLogError::invalid_configuration(format!(
                "capacity must be between 1 and {MAX_CAPACITY}"
            )));
        }
        Ok(())
    }
}

/// Counters describing log activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventLogStats {
    /// Entries committed since creation.
    pub committed: u64,
    /// Entries evicted because the ring was full.
    pub evicted: u64,
    /// Debugger breaks requested.
    pub breaks: u64,
}

/// Append-only, strictly ordered ring of [`LogEntry`] values.
///
/// Entries get their order when created with [`EventLog::new_entry`] and
/// become visible on [`EventLog::commit`]. The ring is kept sorted by order
/// even when concurrent writers commit out of sequence.
pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    debugger: DebuggerProbe,
    committed: AtomicU64,
    evicted: AtomicU64,
    breaks: AtomicU64,
}

impl EventLog {
    /// Create a log without a debugger.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: EventLogConfig) -> EventLogResult<Self> {
        Self::with_debugger(config, Arc::new(NoDebugger))
    }

    /// Create a log with an injected debugger hook.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_debugger(
        config: EventLogConfig,
        hook: Arc<dyn DebuggerHook>,
    ) -> EventLogResult<Self> {
        config.validate()?;
        Ok(Self {
            entries: Mutex::new(VecDeque::with_capacity(config.capacity)),
            capacity: config.capacity,
            debugger: DebuggerProbe::new(hook, config.debug_flags),
            committed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            breaks: AtomicU64::new(0),
        })
    }

    /// Start an entry at `level`, assigning the next event order.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::InvalidLevel`] for [`LogLevel::All`].
    #[track_caller]
    pub fn new_entry(&self, level: LogLevel) -> EventLogResult<PendingEntry> {
        if level == LogLevel::All {
            return Err(EventLogError::InvalidLevel(level));
        }
        Ok(PendingEntry::new(next_event_order(), level, CallSite::caller()))
    }

    /// Start a [`LogLevel::CriticalError`] entry.
    #[track_caller]
    pub fn new_critical_error(&self) -> PendingEntry {
        PendingEntry::new(next_event_order(), LogLevel::CriticalError, CallSite::caller())
    }

    /// Start a [`LogLevel::Assertion`] entry.
    #[track_caller]
    pub fn new_assertion(&self) -> PendingEntry {
        PendingEntry::new(next_event_order(), LogLevel::Assertion, CallSite::caller())
    }

    /// Start a [`LogLevel::Error`] entry.
    #[track_caller]
    pub fn new_error(&self) -> PendingEntry {
        PendingEntry::new(next_event_order(), LogLevel::Error, CallSite::caller())
    }

    /// Start a [`LogLevel::Warning`] entry.
    #[track_caller]
    pub fn new_warning(&self) -> PendingEntry {
        PendingEntry::new(next_event_order(), LogLevel::Warning, CallSite::caller())
    }

    /// Start a [`LogLevel::Event`] entry.
    #[track_caller]
    pub fn new_event(&self) -> PendingEntry {
        PendingEntry::new(next_event_order(), LogLevel::Event, CallSite::caller())
    }

    /// Start a [`LogLevel::Trace`] entry.
    #[track_caller]
    pub fn new_trace(&self) -> PendingEntry {
        PendingEntry::new(next_event_order(), LogLevel::Trace, CallSite::caller())
    }

    /// Start a [`LogLevel::LowResource`] entry.
    #[track_caller]
    pub fn new_low_resource(&self) -> PendingEntry {
        PendingEntry::new(next_event_order(), LogLevel::LowResource, CallSite::caller())
    }

    /// Start a [`LogLevel::DmmEvent`] entry.
    #[track_caller]
    pub fn new_dmm_event(&self) -> PendingEntry {
        PendingEntry::new(next_event_order(), LogLevel::DmmEvent, CallSite::caller())
    }

    /// Make a pending entry visible and return a copy of it.
    ///
    /// The entry is mirrored into `tracing`, and the debugger hook runs if a
    /// debugger is present and the debug flags ask for a break at this level.
    pub fn commit(&self, pending: PendingEntry) -> LogEntry {
        let entry = pending.into_entry();
        {
            let mut entries = self.entries.lock();
            let position = entries.partition_point(|e| e.event_order() < entry.event_order());
            entries.insert(position, entry.clone());
            while entries.len() > self.capacity {
                entries.pop_front();
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.committed.fetch_add(1, Ordering::Relaxed);

        mirror_to_tracing(&entry);
        if self.debugger.maybe_break(&entry) {
            self.breaks.fetch_add(1, Ordering::Relaxed);
        }
        entry
    }

    /// Most recent entries at or above `level`, most recent first.
    ///
    /// Returns nothing for [`LogLevel::All`].
    #[must_use]
    pub fn recent(&self, level: LogLevel, max_entries: usize) -> Vec<LogEntry> {
        if level == LogLevel::All || max_entries == 0 {
            return Vec::new();
        }
        let entries = self.entries.lock();
        entries
            .iter()
            .rev()
            .filter(|entry| level.selects(entry.level()))
            .take(max_entries)
            .cloned()
            .collect()
    }

    /// Encode recent entries into `buffer` as fixed-size records.
    ///
    /// Writes at most `max_entries` records and never more than fit into
    /// `buffer`. Returns the number of bytes written, which is 0 for
    /// [`LogLevel::All`].
    pub fn copy_recent(&self, level: LogLevel, max_entries: usize, buffer: &mut [u8]) -> usize {
        let fit = buffer.len() / RECORD_SIZE;
        let entries = self.recent(level, max_entries.min(fit));
        let mut written = 0;
        for (chunk, entry) in buffer.chunks_exact_mut(RECORD_SIZE).zip(entries.iter()) {
            chunk.copy_from_slice(&entry.to_record());
            written += RECORD_SIZE;
        }
        written
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entry is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Ring capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> EventLogStats {
        EventLogStats {
            committed: self.committed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            breaks: self.breaks.load(Ordering::Relaxed),
        }
    }

    /// Debugger probe used by this log.
    #[must_use]
    pub fn debugger(&self) -> &DebuggerProbe {
        &self.debugger
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: EventLogConfig::default().capacity,
            debugger: DebuggerProbe::default(),
            committed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            breaks: AtomicU64::new(0),
        }
    }
}

impl core::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventLog")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn mirror_to_tracing(entry: &LogEntry) {
    let site = entry.call_site();
    let params = entry.parameters();
    match entry.level() {
        LogLevel::CriticalError | LogLevel::Assertion | LogLevel::Error => tracing::error!(
            event_order = entry.event_order(),
            level = %entry.level(),
            thread = %entry.thread(),
            file = site.file,
            line = site.line,
            ?params,
            "watchdog log entry"
        ),
        LogLevel::Warning | LogLevel::LowResource => tracing::warn!(
            event_order = entry.event_order(),
            level = %entry.level(),
            thread = %entry.thread(),
            ?params,
            "watchdog log entry"
        ),
        LogLevel::Event | LogLevel::DmmEvent => tracing::info!(
            event_order = entry.event_order(),
            level = %entry.level(),
            ?params,
            "watchdog log entry"
        ),
        LogLevel::Trace | LogLevel::All => tracing::trace!(
            event_order = entry.event_order(),
            level = %entry.level(),
            ?params,
            "watchdog log entry"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_log(capacity: usize) -> EventLogResult<EventLog> {
        EventLog::new(EventLogConfig {
            capacity,
            ..Default::default()
        })
    }

    #[test]
    fn test_commit_makes_entry_visible() -> EventLogResult<()> {
        let log = small_log(8)?;
        let pending = log.new_warning().with_parameters(&[7]);
        assert!(log.is_empty());

        let entry = log.commit(pending);
        assert_eq!(log.len(), 1);
        assert_eq!(entry.parameters()[0], 7);
        assert_eq!(entry.call_site().file, file!());
        Ok(())
    }

    #[test]
    fn test_out_of_order_commit_stays_sorted() -> EventLogResult<()> {
        let log = small_log(8)?;
        let first = log.new_event();
        let second = log.new_event();
        let second_order = second.event_order();
        log.commit(second);
        log.commit(first);

        let recent = log.recent(LogLevel::Event, 8);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_order(), second_order);
        assert!(recent[0].event_order() > recent[1].event_order());
        Ok(())
    }

    #[test]
    fn test_ring_evicts_oldest() -> EventLogResult<()> {
        let log = small_log(2)?;
        for _ in 0..5 {
            log.commit(log.new_error());
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.stats().evicted, 3);
        assert_eq!(log.stats().committed, 5);
        Ok(())
    }

    #[test]
    fn test_new_entry_rejects_all_sentinel() -> EventLogResult<()> {
        let log = small_log(2)?;
        assert!(matches!(
            log.new_entry(LogLevel::All),
            Err(EventLogError::InvalidLevel(LogLevel::All))
        ));
        Ok(())
    }

    #[test]
    fn test_config_validation() {
        let config = EventLogConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(EventLogConfig::default().validate().is_ok());
    }
}
