//! Snapshot tests for event log formatting.

use hangwatch_eventlog::{EventLogError, LogLevel, ThreadTag};
use insta::assert_snapshot;

#[test]
fn test_invalid_level_display() {
    assert_snapshot!(
        EventLogError::InvalidLevel(LogLevel::All).to_string(),
        @"Log level WdLogLevelAll cannot be used for an entry"
    );
}

#[test]
fn test_invalid_configuration_display() {
    assert_snapshot!(
        EventLogError::invalid_configuration("capacity must be between 1 and 1048576").to_string(),
        @"Invalid event log configuration: capacity must be between 1 and 1048576"
    );
}

#[test]
fn test_level_names() {
    let names: Vec<&str> = LogLevel::CONCRETE.iter().map(|l| l.as_str()).collect();
    assert_snapshot!(
        names.join(","),
        @"WdCriticalError,WdAssertion,WdError,WdWarning,WdEvent,WdTrace,WdLowResource,WdDmmEvent"
    );
}

#[test]
fn test_thread_tag_display() {
    assert_snapshot!(ThreadTag::from_raw(42).to_string(), @"thread#42");
}
