//! Snapshot tests for watchdog error formatting.

use hangwatch_timer::TimerError;
use hangwatch_watchdog::{DeadlineState, ProgressState, SubsystemConfig, WatchdogError};
use insta::assert_snapshot;

#[test]
fn test_invalid_state_display() {
    assert_snapshot!(
        WatchdogError::invalid_state("start", DeadlineState::Expired).to_string(),
        @"Invalid state for start: watchdog is expired"
    );
    assert_snapshot!(
        WatchdogError::invalid_state("suspend", ProgressState::Idle).to_string(),
        @"Invalid state for suspend: watchdog is idle"
    );
}

#[test]
fn test_context_errors_display() {
    assert_snapshot!(
        WatchdogError::AlreadyAttached { size: 32 }.to_string(),
        @"Context already attached (32 bytes)"
    );
    assert_snapshot!(WatchdogError::NotAttached.to_string(), @"No context attached");
}

#[test]
fn test_timer_error_display() {
    assert_snapshot!(
        WatchdogError::from(TimerError::ShutDown).to_string(),
        @"Timer error: Timer dispatcher is shut down"
    );
}

#[test]
fn test_rejected_config_display() {
    let config = SubsystemConfig {
        miss_threshold: 0,
        ..SubsystemConfig::default()
    };
    let err = config.validate().err().map(|e| e.to_string()).unwrap_or_default();
    assert_snapshot!(err, @"Invalid configuration: miss_threshold must be greater than 0");
}
