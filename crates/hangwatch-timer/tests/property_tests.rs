//! Property-based tests for timer scheduling and cancellation.

use std::sync::Arc;
use std::time::Duration;

use hangwatch_test_helpers::wait_until;
use hangwatch_timer::{DispatchMetrics, TimerAction, TimerDispatcher};
use parking_lot::Mutex;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_only_uncanceled_timers_fire(
        plan in prop::collection::vec((0u64..15, any::<bool>()), 1..12),
    ) {
        let dispatcher = TimerDispatcher::new()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let fired = Arc::new(Mutex::new(Vec::new()));

        let mut timers = Vec::new();
        for (index, (delay_ms, _)) in plan.iter().enumerate() {
            let fired = Arc::clone(&fired);
            let timer = dispatcher
                .create_timer(move || {
                    fired.lock().push(index);
                    TimerAction::Stop
                })
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            timer
                .schedule(Duration::from_millis(20 + delay_ms))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            timers.push(timer);
        }
        for (timer, (_, cancel)) in timers.iter().zip(&plan) {
            if *cancel {
                prop_assert!(timer.cancel());
            }
        }

        let expected: Vec<usize> = plan
            .iter()
            .enumerate()
            .filter(|(_, (_, cancel))| !cancel)
            .map(|(index, _)| index)
            .collect();
        prop_assert!(wait_until(Duration::from_secs(5), || fired.lock().len() >= expected.len()));
        std::thread::sleep(Duration::from_millis(40));

        let mut got = fired.lock().clone();
        got.sort_unstable();
        prop_assert_eq!(got, expected);
        prop_assert_eq!(dispatcher.armed_count(), 0);
    }

    #[test]
    fn prop_percentiles_are_bounded_by_samples(
        samples in prop::collection::vec(0u64..1_000_000, 1..200),
        percent in 0u8..=100,
    ) {
        let mut metrics = DispatchMetrics::with_capacity(256);
        for sample in &samples {
            metrics.record_fire(*sample);
        }
        let value = metrics.percentile_lateness_ns(percent);
        let min = samples.iter().copied().min().unwrap_or(0);
        let max = samples.iter().copied().max().unwrap_or(0);
        prop_assert!(value >= min && value <= max);
        prop_assert_eq!(metrics.max_lateness_ns, max);
    }
}
