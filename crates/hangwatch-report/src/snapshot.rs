//! Owned dump blobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::ReportResult;
use crate::format::{DumpContents, decode_dump};

/// A debugger-ready dump blob.
///
/// Created by [`crate::DebugReportPipeline::create_snapshot`] and destroyed
/// on drop. The pipeline counts live snapshots.
pub struct Snapshot {
    bytes: Vec<u8>,
    live: Arc<AtomicUsize>,
}

impl Snapshot {
    pub(crate) fn new(bytes: Vec<u8>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self { bytes, live }
    }

    /// Encoded dump.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Dump size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the dump is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the dump.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is not a valid dump.
    pub fn contents(&self) -> ReportResult<DumpContents> {
        decode_dump(&self.bytes)
    }

    pub(crate) fn take_bytes(mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(size = self.bytes.len(), "snapshot destroyed");
    }
}

impl core::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Snapshot")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_count_follows_drop() {
        let live = Arc::new(AtomicUsize::new(0));
        let snapshot = Snapshot::new(vec![1, 2, 3], Arc::clone(&live));
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.len(), 3);

        let bytes = snapshot.take_bytes();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }
}
