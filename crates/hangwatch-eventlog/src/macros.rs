//! Convenience macro for one-shot log entries

/// Create, fill and commit a log entry in one step.
///
/// Evaluates to `EventLogResult<LogEntry>`; the only failure is passing the
/// `All` sentinel as the level.
///
/// # Example
///
/// ```rust
/// use hangwatch_eventlog::{EventLog, LogLevel, wd_log};
///
/// let log = EventLog::default();
/// let entry = wd_log!(log, LogLevel::Warning, 0xdead, 7)?;
/// assert_eq!(entry.parameters()[1], 7);
/// # Ok::<(), hangwatch_eventlog::EventLogError>(())
/// ```
#[macro_export]
macro_rules! wd_log {
    ($log:expr, $level:expr $(, $param:expr)* $(,)?) => {
        $log.new_entry($level).map(|pending| {
            $log.commit(pending.with_parameters(&[$(($param) as u64),*]))
        })
    };
}

#[cfg(test)]
mod tests {
    use crate::{EventLog, EventLogError, LogLevel};

    #[test]
    fn test_wd_log_commits_parameters() -> Result<(), EventLogError> {
        let log = EventLog::default();
        let entry = wd_log!(log, LogLevel::Error, 1u32, 2u64, 3usize)?;
        assert_eq!(entry.parameters(), &[1, 2, 3, 0, 0]);
        assert_eq!(entry.call_site().file, file!());
        assert_eq!(log.len(), 1);
        Ok(())
    }

    #[test]
    fn test_wd_log_without_parameters() -> Result<(), EventLogError> {
        let log = EventLog::default();
        let entry = wd_log!(log, LogLevel::Trace)?;
        assert_eq!(entry.parameters(), &[0; 5]);
        assert!(wd_log!(log, LogLevel::All, 1).is_err());
        Ok(())
    }
}
