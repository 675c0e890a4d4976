//! Snapshot tests for report error formatting.

use hangwatch_report::{ReportError, ReportState};
use insta::assert_snapshot;

#[test]
fn test_invalid_state_display() {
    let err = ReportError::InvalidState {
        report_id: "00000000-0000-0000-0000-000000000000".to_string(),
        state: ReportState::Completed,
    };
    assert_snapshot!(
        err.to_string(),
        @"Report 00000000-0000-0000-0000-000000000000 is already completed"
    );
}

#[test]
fn test_size_limit_display() {
    assert_snapshot!(
        ReportError::size_limit("dump", 2048, 1024).to_string(),
        @"Size limit exceeded: dump is 2048 bytes, limit is 1024"
    );
}

#[test]
fn test_unsupported_version_display() {
    assert_snapshot!(
        ReportError::UnsupportedVersion(9).to_string(),
        @"Unsupported dump version: 9"
    );
}
