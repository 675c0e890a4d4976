//! Dump blob format.
//!
//! A dump is a bincode-encoded [`DumpContents`]: a [`DumpHeader`] with the
//! failure code and arguments, the most recent event log entries as raw
//! fixed-size records, and any secondary data blocks.
//!
//! ## Versioning
//!
//! - Version 1: header, log records, secondary blocks

use hangwatch_eventlog::{LogRecord, RECORD_SIZE};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceId;
use crate::error::{ReportError, ReportResult};

/// Dump magic number
pub const DUMP_MAGIC: &[u8; 4] = b"HWD1";

/// Current dump format version
pub const DUMP_VERSION: u32 = 1;

/// Maximum supported dump format version
pub const MAX_SUPPORTED_VERSION: u32 = 1;

fn config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

/// Dump header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpHeader {
    /// Magic number "HWD1"
    pub magic: [u8; 4],
    /// Format version
    pub version: u32,
    /// Capture time (Unix milliseconds)
    pub created_unix_ms: i64,
    /// Device the dump was captured for, if any
    pub device: Option<DeviceId>,
    /// Failure code
    pub code: u32,
    /// Failure arguments
    pub args: [u64; 4],
    /// Event order current at capture time
    pub event_order: u64,
}

impl DumpHeader {
    /// Create a header stamped with the current time.
    #[must_use]
    pub fn new(device: Option<DeviceId>, code: u32, args: [u64; 4]) -> Self {
        Self {
            magic: *DUMP_MAGIC,
            version: DUMP_VERSION,
            created_unix_ms: chrono::Utc::now().timestamp_millis(),
            device,
            code,
            args,
            event_order: hangwatch_eventlog::current_event_order(),
        }
    }

    /// Validate magic and version.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidMagic`] or [`ReportError::UnsupportedVersion`].
    pub fn validate(&self) -> ReportResult<()> {
        if &self.magic != DUMP_MAGIC {
            return Err(ReportError::InvalidMagic {
                expected: *DUMP_MAGIC,
                actual: self.magic,
            });
        }
        if self.version == 0 || self.version > MAX_SUPPORTED_VERSION {
            return Err(ReportError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Caller-supplied data block tagged with a GUID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryBlock {
    /// Block identifier
    pub guid: [u8; 16],
    /// Block payload
    pub data: Vec<u8>,
}

impl SecondaryBlock {
    /// Create a block.
    #[must_use]
    pub fn new(guid: Uuid, data: Vec<u8>) -> Self {
        Self {
            guid: *guid.as_bytes(),
            data,
        }
    }

    /// Block identifier as a UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        Uuid::from_bytes(self.guid)
    }
}

/// Decoded dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpContents {
    /// Header
    pub header: DumpHeader,
    /// Event log records, most recent first
    pub log_records: Vec<u8>,
    /// Secondary data blocks
    pub secondary: Vec<SecondaryBlock>,
}

impl DumpContents {
    /// Decode the embedded event log records.
    #[must_use]
    pub fn log_entries(&self) -> Vec<LogRecord> {
        self.log_records
            .chunks_exact(RECORD_SIZE)
            .filter_map(LogRecord::from_bytes)
            .collect()
    }

    /// Total secondary payload size in bytes.
    #[must_use]
    pub fn secondary_size(&self) -> usize {
        self.secondary.iter().map(|block| block.data.len()).sum()
    }
}

/// Encode a dump.
///
/// # Errors
///
/// Returns [`ReportError::Serialization`] if encoding fails.
pub fn encode_dump(contents: &DumpContents) -> ReportResult<Vec<u8>> {
    bincode::serde::encode_to_vec(contents, config()).map_err(ReportError::from)
}

/// Decode and validate a dump.
///
/// # Errors
///
/// Returns [`ReportError::Deserialization`] for malformed input and a header
/// validation error for a foreign or newer dump.
pub fn decode_dump(bytes: &[u8]) -> ReportResult<DumpContents> {
    let (contents, _): (DumpContents, usize) =
        bincode::serde::decode_from_slice(bytes, config()).map_err(ReportError::from)?;
    contents.header.validate()?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_validation() {
        let mut header = DumpHeader::new(None, 0x1a0, [1, 2, 3, 4]);
        assert!(header.validate().is_ok());

        header.magic = *b"XXXX";
        assert!(matches!(
            header.validate(),
            Err(ReportError::InvalidMagic { .. })
        ));

        header.magic = *DUMP_MAGIC;
        header.version = MAX_SUPPORTED_VERSION + 1;
        assert_eq!(
            header.validate(),
            Err(ReportError::UnsupportedVersion(MAX_SUPPORTED_VERSION + 1))
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_dump(&[0xff; 3]).is_err());
    }

    #[test]
    fn test_secondary_block_uuid() {
        let guid = Uuid::new_v4();
        let block = SecondaryBlock::new(guid, vec![1, 2, 3]);
        assert_eq!(block.uuid(), guid);
    }
}
