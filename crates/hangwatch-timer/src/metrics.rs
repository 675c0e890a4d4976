//! Dispatch lateness and outcome counters.

/// Counters and lateness samples collected by the dispatcher thread.
///
/// Lateness is the delay between a timer's due time and the moment its
/// callback started running. Recent samples are kept in a bounded ring for
/// percentile queries.
#[derive(Debug, Clone)]
pub struct DispatchMetrics {
    /// Callbacks invoked
    pub fired: u64,

    /// Callbacks that asked to be re-armed and were
    pub rearmed: u64,

    /// Cancellations that disarmed a pending timer
    pub canceled: u64,

    /// Heap entries skipped because the timer was re-scheduled or canceled
    pub stale_skipped: u64,

    /// Callbacks that panicked
    pub panicked: u64,

    /// Maximum observed lateness in nanoseconds
    pub max_lateness_ns: u64,

    /// Most recent lateness in nanoseconds
    pub last_lateness_ns: u64,

    lateness_sum_ns: u128,
    samples: Vec<u64>,
    max_samples: usize,
    next_sample_index: usize,
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl DispatchMetrics {
    /// Create metrics retaining up to `max_samples` lateness samples.
    #[must_use]
    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            fired: 0,
            rearmed: 0,
            canceled: 0,
            stale_skipped: 0,
            panicked: 0,
            max_lateness_ns: 0,
            last_lateness_ns: 0,
            lateness_sum_ns: 0,
            samples: Vec::with_capacity(max_samples),
            max_samples,
            next_sample_index: 0,
        }
    }

    /// Record one callback invocation started `lateness_ns` after its due time.
    pub fn record_fire(&mut self, lateness_ns: u64) {
        self.fired = self.fired.saturating_add(1);
        self.max_lateness_ns = self.max_lateness_ns.max(lateness_ns);
        self.last_lateness_ns = lateness_ns;
        self.lateness_sum_ns = self.lateness_sum_ns.saturating_add(u128::from(lateness_ns));

        if self.max_samples == 0 {
            return;
        }
        if self.samples.len() < self.max_samples {
            self.samples.push(lateness_ns);
        } else if let Some(slot) = self.samples.get_mut(self.next_sample_index) {
            *slot = lateness_ns;
            self.next_sample_index = (self.next_sample_index + 1) % self.max_samples;
        }
    }

    /// Mean lateness in nanoseconds over every recorded fire.
    #[must_use]
    pub fn mean_lateness_ns(&self) -> u64 {
        if self.fired == 0 {
            return 0;
        }
        u64::try_from(self.lateness_sum_ns / u128::from(self.fired)).unwrap_or(u64::MAX)
    }

    /// Lateness at `percent` (0..=100) over the retained samples.
    #[must_use]
    pub fn percentile_lateness_ns(&self, percent: u8) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let mut scratch = self.samples.clone();
        let len = scratch.len();
        let index = (len * usize::from(percent.min(100)) / 100).min(len - 1);
        let (_, value, _) = scratch.select_nth_unstable(index);
        *value
    }

    /// Number of retained lateness samples.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
