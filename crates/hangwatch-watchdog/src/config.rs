//! Subsystem configuration.

use serde::{Deserialize, Serialize};

use hangwatch_eventlog::{EventLogConfig, LogLevel};
use hangwatch_report::ReportConfig;

use crate::error::{WatchdogError, WatchdogResult};

/// Largest accepted context blob, regardless of configuration.
pub const MAX_CONTEXT_SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// Severity of the entry logged when a deadline expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineSeverity {
    /// [`LogLevel::Error`].
    #[default]
    Error,
    /// [`LogLevel::CriticalError`].
    CriticalError,
}

impl DeadlineSeverity {
    /// Log level written on expiry.
    #[must_use]
    pub const fn level(self) -> LogLevel {
        match self {
            Self::Error => LogLevel::Error,
            Self::CriticalError => LogLevel::CriticalError,
        }
    }
}

/// Severity of the entry logged when a progress watchdog triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSeverity {
    /// [`LogLevel::Warning`].
    #[default]
    Warning,
    /// [`LogLevel::Error`].
    Error,
}

impl ProgressSeverity {
    /// Log level written on trigger.
    #[must_use]
    pub const fn level(self) -> LogLevel {
        match self {
            Self::Warning => LogLevel::Warning,
            Self::Error => LogLevel::Error,
        }
    }
}

/// Configuration for a [`crate::Subsystem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsystemConfig {
    /// Maximum number of live watchdog objects.
    pub max_objects: usize,
    /// Maximum size of an attached context blob in bytes.
    pub max_context_size: usize,
    /// Entry level written when a deadline expires.
    pub deadline_severity: DeadlineSeverity,
    /// Entry level written when a progress watchdog triggers.
    pub progress_severity: ProgressSeverity,
    /// Consecutive periods without progress before a progress watchdog triggers.
    pub miss_threshold: u32,
    /// Complete the captured report once the recovery callback returns.
    ///
    /// When disabled the report stays pending on the watchdog until the
    /// client takes it or the object is released.
    pub auto_complete_reports: bool,
    /// Event log settings.
    pub event_log: EventLogConfig,
    /// Debug report settings.
    pub report: ReportConfig,
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        Self {
            max_objects: 4096,
            max_context_size: 64 * 1024,
            deadline_severity: DeadlineSeverity::default(),
            progress_severity: ProgressSeverity::default(),
            miss_threshold: 1,
            auto_complete_reports: true,
            event_log: EventLogConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl SubsystemConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> WatchdogResult<()> {
        if self.max_objects == 0 {
            return Err(WatchdogError::invalid_configuration(
                "max_objects must be greater than 0",
            ));
        }
        if self.max_context_size > MAX_CONTEXT_SIZE_LIMIT {
            return Err(WatchdogError::invalid_configuration(format!(
                "max_context_size must not exceed {MAX_CONTEXT_SIZE_LIMIT}"
            )));
        }
        if self.miss_threshold == 0 {
            return Err(WatchdogError::invalid_configuration(
                "miss_threshold must be greater than 0",
            ));
        }
        self.event_log.validate()?;
        self.report.validate()?;
        Ok(())
    }

    /// Parse and validate a JSON configuration. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidConfiguration`] for malformed JSON or
    /// invalid values.
    pub fn from_json_str(json: &str) -> WatchdogResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| WatchdogError::invalid_configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> SubsystemConfigBuilder {
        SubsystemConfigBuilder::default()
    }
}

/// Builder for [`SubsystemConfig`].
#[derive(Debug, Default)]
pub struct SubsystemConfigBuilder {
    config: SubsystemConfig,
}

impl SubsystemConfigBuilder {
    /// Set the live object limit.
    #[must_use]
    pub fn max_objects(mut self, count: usize) -> Self {
        self.config.max_objects = count;
        self
    }

    /// Set the context blob limit in bytes.
    #[must_use]
    pub fn max_context_size(mut self, bytes: usize) -> Self {
        self.config.max_context_size = bytes;
        self
    }

    /// Set the deadline expiry severity.
    #[must_use]
    pub fn deadline_severity(mut self, severity: DeadlineSeverity) -> Self {
        self.config.deadline_severity = severity;
        self
    }

    /// Set the progress trigger severity.
    #[must_use]
    pub fn progress_severity(mut self, severity: ProgressSeverity) -> Self {
        self.config.progress_severity = severity;
        self
    }

    /// Set the consecutive miss threshold.
    #[must_use]
    pub fn miss_threshold(mut self, misses: u32) -> Self {
        self.config.miss_threshold = misses;
        self
    }

    /// Enable or disable report completion after the callback.
    #[must_use]
    pub fn auto_complete_reports(mut self, enabled: bool) -> Self {
        self.config.auto_complete_reports = enabled;
        self
    }

    /// Set the event log configuration.
    #[must_use]
    pub fn event_log(mut self, config: EventLogConfig) -> Self {
        self.config.event_log = config;
        self
    }

    /// Set the report configuration.
    #[must_use]
    pub fn report(mut self, config: ReportConfig) -> Self {
        self.config.report = config;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> WatchdogResult<SubsystemConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
