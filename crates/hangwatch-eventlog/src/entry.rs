//! Log entries, thread tags and the fixed binary record layout.

use core::panic::Location;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::level::LogLevel;

/// Number of opaque parameters carried by each entry.
pub const MAX_PARAMETERS: usize = 5;

/// Size in bytes of one encoded entry record.
pub const RECORD_SIZE: usize = 64;

static NEXT_THREAD_TAG: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TAG: Cell<u64> = const { Cell::new(0) };
}

/// Non-owning identifier of a thread.
///
/// Tags are assigned lazily on first use, start at 1 and are never reused
/// within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadTag(u64);

impl ThreadTag {
    /// Tag of the calling thread.
    #[must_use]
    pub fn current() -> Self {
        THREAD_TAG.with(|tag| {
            let mut value = tag.get();
            if value == 0 {
                value = NEXT_THREAD_TAG.fetch_add(1, Ordering::Relaxed);
                tag.set(value);
            }
            Self(value)
        })
    }

    /// Rebuild a tag from its raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for ThreadTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Source location of the code that created an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Source file.
    pub file: &'static str,
    /// Line number.
    pub line: u32,
}

impl CallSite {
    /// Location of the caller of the enclosing `#[track_caller]` chain.
    #[must_use]
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

/// A committed, immutable event log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    event_order: u64,
    level: LogLevel,
    thread: ThreadTag,
    call_site: CallSite,
    parameters: [u64; MAX_PARAMETERS],
}

impl LogEntry {
    /// Global order of this entry.
    #[must_use]
    pub const fn event_order(&self) -> u64 {
        self.event_order
    }

    /// Severity.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Thread that created the entry.
    #[must_use]
    pub const fn thread(&self) -> ThreadTag {
        self.thread
    }

    /// Where the entry was created.
    #[must_use]
    pub const fn call_site(&self) -> CallSite {
        self.call_site
    }

    /// Opaque parameters. For critical errors: bug-check code, then arguments.
    #[must_use]
    pub const fn parameters(&self) -> &[u64; MAX_PARAMETERS] {
        &self.parameters
    }

    /// Encode into the fixed little-endian record layout.
    ///
    /// | Offset | Size | Field       |
    /// |--------|------|-------------|
    /// | 0      | 8    | event_order |
    /// | 8      | 1    | level       |
    /// | 9      | 3    | (reserved)  |
    /// | 12     | 4    | line        |
    /// | 16     | 8    | thread      |
    /// | 24     | 40   | parameters  |
    #[must_use]
    pub fn to_record(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        let mut words = bytes.chunks_exact_mut(8);
        if let Some(word) = words.next() {
            word.copy_from_slice(&self.event_order.to_le_bytes());
        }
        if let Some(word) = words.next() {
            let mut header = [0u8; 8];
            header[0] = self.level.to_raw();
            header[4..].copy_from_slice(&self.call_site.line.to_le_bytes());
            word.copy_from_slice(&header);
        }
        if let Some(word) = words.next() {
            word.copy_from_slice(&self.thread.as_u64().to_le_bytes());
        }
        for (word, parameter) in words.zip(self.parameters.iter()) {
            word.copy_from_slice(&parameter.to_le_bytes());
        }
        bytes
    }
}

/// Decoded form of a binary entry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    /// Global order.
    pub event_order: u64,
    /// Severity.
    pub level: LogLevel,
    /// Line of the creating call site.
    pub line: u32,
    /// Creating thread.
    pub thread: ThreadTag,
    /// Opaque parameters.
    pub parameters: [u64; MAX_PARAMETERS],
}

impl LogRecord {
    /// Decode one record. Returns `None` for a short slice or an unknown level.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let record = bytes.get(..RECORD_SIZE)?;
        let mut words = record
            .chunks_exact(8)
            .map(|chunk| <[u8; 8]>::try_from(chunk).ok());

        let event_order = u64::from_le_bytes(words.next()??);
        let header = words.next()??;
        let level = LogLevel::from_raw(header[0])?;
        let line = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let thread = ThreadTag::from_raw(u64::from_le_bytes(words.next()??));

        let mut parameters = [0u64; MAX_PARAMETERS];
        for slot in &mut parameters {
            *slot = u64::from_le_bytes(words.next()??);
        }

        Some(Self {
            event_order,
            level,
            line,
            thread,
            parameters,
        })
    }
}

/// An entry that has an order assigned but is not yet visible to queries.
#[derive(Debug)]
#[must_use = "a pending entry is only visible once committed"]
pub struct PendingEntry {
    entry: LogEntry,
}

impl PendingEntry {
    pub(crate) fn new(event_order: u64, level: LogLevel, call_site: CallSite) -> Self {
        Self {
            entry: LogEntry {
                event_order,
                level,
                thread: ThreadTag::current(),
                call_site,
                parameters: [0; MAX_PARAMETERS],
            },
        }
    }

    /// Order assigned to this entry.
    #[must_use]
    pub const fn event_order(&self) -> u64 {
        self.entry.event_order
    }

    /// Severity.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.entry.level
    }

    /// Set one parameter. Returns `false` if `index` is out of range.
    pub fn set_parameter(&mut self, index: usize, value: u64) -> bool {
        match self.entry.parameters.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Fill parameters from a slice; values past [`MAX_PARAMETERS`] are ignored.
    pub fn with_parameters(mut self, values: &[u64]) -> Self {
        for (slot, value) in self.entry.parameters.iter_mut().zip(values) {
            *slot = *value;
        }
        self
    }

    pub(crate) fn into_entry(self) -> LogEntry {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_tag_is_stable_per_thread() {
        let a = ThreadTag::current();
        let b = ThreadTag::current();
        assert_eq!(a, b);

        let other = std::thread::spawn(ThreadTag::current).join().ok();
        assert!(other.is_some());
        assert_ne!(other, Some(a));
    }

    #[test]
    fn test_record_layout() {
        let entry = PendingEntry::new(
            0x0102_0304_0506_0708,
            LogLevel::Warning,
            CallSite {
                file: "x.rs",
                line: 42,
            },
        )
        .with_parameters(&[1, 2, 3, 4, 5, 6])
        .into_entry();

        let record = entry.to_record();
        assert_eq!(record[0], 0x08);
        assert_eq!(record[8], LogLevel::Warning.to_raw());
        assert_eq!(record[12], 42);
        assert_eq!(record[24], 1);
        assert_eq!(record[56], 5);

        let decoded = LogRecord::from_bytes(&record);
        assert_eq!(
            decoded.map(|r| (r.event_order, r.level, r.line, r.parameters)),
            Some((
                0x0102_0304_0506_0708,
                LogLevel::Warning,
                42,
                [1, 2, 3, 4, 5]
            ))
        );
    }

    #[test]
    fn test_decode_rejects_short_or_unknown() {
        assert!(LogRecord::from_bytes(&[0u8; 10]).is_none());
        let mut record = [0u8; RECORD_SIZE];
        record[8] = 200;
        assert!(LogRecord::from_bytes(&record).is_none());
    }

    #[test]
    fn test_set_parameter_bounds() {
        let mut pending = PendingEntry::new(1, LogLevel::Event, CallSite::caller());
        assert!(pending.set_parameter(4, 9));
        assert!(!pending.set_parameter(5, 9));
        assert_eq!(pending.into_entry().parameters()[4], 9);
    }
}
