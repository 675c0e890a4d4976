//! Property-based tests for watchdog state machines

use std::time::Duration;

use hangwatch_report::{DeviceId, MemorySink};
use hangwatch_watchdog::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum DeadlineOp {
    Start,
    Stop(bool),
    Suspend,
    Resume(bool),
    Reset,
}

fn arb_deadline_op() -> impl Strategy<Value = DeadlineOp> {
    prop_oneof![
        3 => Just(DeadlineOp::Start),
        2 => any::<bool>().prop_map(DeadlineOp::Stop),
        2 => Just(DeadlineOp::Suspend),
        2 => any::<bool>().prop_map(DeadlineOp::Resume),
        1 => Just(DeadlineOp::Reset),
    ]
}

#[derive(Debug, Clone, Copy)]
enum SectionOp {
    Enter,
    Exit,
}

fn arb_section_op() -> impl Strategy<Value = SectionOp> {
    prop_oneof![Just(SectionOp::Enter), Just(SectionOp::Exit)]
}

fn subsystem() -> Result<Subsystem, TestCaseError> {
    Subsystem::builder(SubsystemConfig::default())
        .sink(Arc::new(MemorySink::new()))
        .build()
        .map_err(|e| TestCaseError::fail(e.to_string()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_deadline_armed_iff_unsuspended_starts(
        ops in prop::collection::vec(arb_deadline_op(), 1..40)
    ) {
        let subsystem = subsystem()?;
        let watchdog = subsystem
            .allocate_deadline(DeviceId::new(1), TimeBasis::Full, 0)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        for op in ops {
            let _ = match op {
                DeadlineOp::Start => watchdog.start(Duration::from_secs(600), |_| {}),
                DeadlineOp::Stop(incremental) => watchdog.stop(incremental),
                DeadlineOp::Suspend => watchdog.suspend(),
                DeadlineOp::Resume(incremental) => watchdog.resume(incremental),
                DeadlineOp::Reset => watchdog.reset(),
            };

            let status = watchdog.status();
            prop_assert!(status.suspend_count <= status.start_count);
            let running = status.start_count > status.suspend_count;
            prop_assert_eq!(status.state == DeadlineState::Armed, running);
            prop_assert_eq!(watchdog.is_armed(), running);
            prop_assert_eq!(status.state == DeadlineState::Idle, status.start_count == 0);
        }
        prop_assert!(subsystem.event_log().is_empty());
    }

    #[test]
    fn prop_progress_complete_never_exceeds_entered(
        ops in prop::collection::vec(arb_section_op(), 1..64)
    ) {
        let subsystem = subsystem()?;
        let watchdog = subsystem
            .allocate_progress(DeviceId::new(2), TimeBasis::Full, 0, true)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let mut depth = 0u64;
        for op in ops {
            match op {
                SectionOp::Enter => {
                    prop_assert!(watchdog.enter_monitored_section().is_ok());
                    depth += 1;
                }
                SectionOp::Exit => {
                    let exited = watchdog.exit_monitored_section().is_ok();
                    prop_assert_eq!(exited, depth > 0);
                    depth = depth.saturating_sub(1);
                }
            }
            let status = watchdog.status();
            prop_assert!(status.in_count_complete <= status.in_count);
            prop_assert_eq!(status.in_count - status.in_count_complete, depth);
        }

        while depth > 0 {
            prop_assert!(watchdog.exit_monitored_section().is_ok());
            depth -= 1;
        }
    }
}
