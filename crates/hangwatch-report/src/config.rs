//! Debug report pipeline configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};

/// Longest short driver name kept in a report.
pub const MAX_SHORT_NAME_LEN: usize = 31;

/// Longest full driver name kept in a report.
pub const MAX_FULL_NAME_LEN: usize = 259;

/// Configuration for [`crate::DebugReportPipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Largest dump blob accepted, in bytes.
    pub max_dump_size: usize,
    /// Largest total of secondary data per report, in bytes.
    pub max_secondary_data: usize,
    /// Recent event log entries embedded into captured dumps.
    pub recent_log_entries: usize,
    /// Short driver name recorded in every report.
    pub short_driver_name: String,
    /// Full driver name recorded in every report.
    pub full_driver_name: String,
    /// Report type recorded in the error-report context.
    pub report_type: String,
    /// Base directory recorded in the error-report context.
    pub base_path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_dump_size: 1024 * 1024,
            max_secondary_data: 256 * 1024,
            recent_log_entries: 32,
            short_driver_name: "hangwatch".to_string(),
            full_driver_name: "hangwatch watchdog subsystem".to_string(),
            report_type: "WatchdogTimeout".to_string(),
            base_path: PathBuf::from("reports"),
        }
    }
}

impl ReportConfig {
    /// Start building a configuration from the defaults.
    #[must_use]
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Configuration`] for a zero dump limit, an empty
    /// or oversized driver name, or an empty report type.
    pub fn validate(&self) -> ReportResult<()> {
        if self.max_dump_size == 0 {
            return Err(ReportError::Configuration(
                "max_dump_size must be greater than zero".to_string(),
            ));
        }
        if self.short_driver_name.is_empty() || self.short_driver_name.len() > MAX_SHORT_NAME_LEN {
            return Err(ReportError::Configuration(format!(
                "short_driver_name must be 1..={MAX_SHORT_NAME_LEN} bytes"
            )));
        }
        if self.full_driver_name.len() > MAX_FULL_NAME_LEN {
            return Err(ReportError::Configuration(format!(
                "full_driver_name must be at most {MAX_FULL_NAME_LEN} bytes"
            )));
        }
        if self.report_type.is_empty() {
            return Err(ReportError::Configuration(
                "report_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ReportConfig`].
#[derive(Debug, Clone, Default)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    /// Set the dump size limit.
    #[must_use]
    pub fn max_dump_size(mut self, bytes: usize) -> Self {
        self.config.max_dump_size = bytes;
        self
    }

    /// Set the secondary data limit.
    #[must_use]
    pub fn max_secondary_data(mut self, bytes: usize) -> Self {
        self.config.max_secondary_data = bytes;
        self
    }

    /// Set how many recent log entries are embedded in dumps.
    #[must_use]
    pub fn recent_log_entries(mut self, count: usize) -> Self {
        self.config.recent_log_entries = count;
        self
    }

    /// Set the driver names.
    #[must_use]
    pub fn driver_names(mut self, short: impl Into<String>, full: impl Into<String>) -> Self {
        self.config.short_driver_name = short.into();
        self.config.full_driver_name = full.into();
        self
    }

    /// Set the report type.
    #[must_use]
    pub fn report_type(mut self, report_type: impl Into<String>) -> Self {
        self.config.report_type = report_type.into();
        self
    }

    /// Set the base path.
    #[must_use]
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_path = path.into();
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// See [`ReportConfig::validate`].
    pub fn build(self) -> ReportResult<ReportConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ReportConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_long_short_name() {
        let result = ReportConfig::builder()
            .driver_names("x".repeat(MAX_SHORT_NAME_LEN + 1), "full")
            .build();
        assert!(matches!(result, Err(ReportError::Configuration(_))));
    }

    #[test]
    fn test_builder_sets_fields() -> ReportResult<()> {
        let config = ReportConfig::builder()
            .max_dump_size(4096)
            .recent_log_entries(4)
            .base_path("/tmp/reports")
            .build()?;
        assert_eq!(config.max_dump_size, 4096);
        assert_eq!(config.recent_log_entries, 4);
        assert_eq!(config.base_path, PathBuf::from("/tmp/reports"));
        Ok(())
    }

    #[test]
    fn test_partial_json_uses_defaults() -> Result<(), serde_json::Error> {
        let config: ReportConfig = serde_json::from_str(r#"{"max_dump_size": 2048}"#)?;
        assert_eq!(config.max_dump_size, 2048);
        assert_eq!(config.short_driver_name, "hangwatch");
        Ok(())
    }
}
