use crate::error::{ControllerError, Result};
use arrears_core::{is_valid_name, DEFAULT_QUOTA_NAME, DEFAULT_SCHEDULER_NAME};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for the namespace controller and its status watcher
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Scheduler name stamped on parked pods. Must not be served by any scheduler.
    pub scheduler_name: String,
    /// Name of the zero-limit ResourceQuota
    pub quota_name: String,
    /// Wait for a pod's deletion beyond its termination grace period, in seconds
    pub recreate_timeout_secs: u64,
    /// Delay before a failed reconciliation is retried, in seconds
    pub retry_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scheduler_name: DEFAULT_SCHEDULER_NAME.to_string(),
            quota_name: DEFAULT_QUOTA_NAME.to_string(),
            recreate_timeout_secs: 10,
            retry_interval_secs: 5,
        }
    }
}

impl ControllerConfig {
    /// Load from a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ControllerError::invalid_config(
                format!("Failed to read config file '{}': {}", path.display(), e),
                "Check that the file exists and is readable",
            )
        })?;
        let config: Self = arrears_core::from_yaml(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.scheduler_name) {
            return Err(ControllerError::invalid_config(
                format!("Invalid scheduler name '{}'", self.scheduler_name),
                "Use a lowercase DNS-1123 name that no real scheduler serves, e.g. 'arrears-debt-scheduler'",
            ));
        }
        if !is_valid_name(&self.quota_name) {
            return Err(ControllerError::invalid_config(
                format!("Invalid quota name '{}'", self.quota_name),
                "Use a lowercase DNS-1123 name, e.g. 'debt-limit0'",
            ));
        }
        if self.recreate_timeout_secs == 0 {
            return Err(ControllerError::invalid_config(
                "recreate_timeout_secs must be greater than zero",
                "A pod's deletion is never confirmed instantly; 10 seconds is a reasonable default",
            ));
        }
        if self.retry_interval_secs == 0 {
            return Err(ControllerError::invalid_config(
                "retry_interval_secs must be greater than zero",
                "Failed reconciliations are retried after this delay, e.g. 5",
            ));
        }
        Ok(())
    }

    pub fn recreate_timeout(&self) -> Duration {
        Duration::from_secs(self.recreate_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = ControllerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scheduler_name, "arrears-debt-scheduler");
        assert_eq!(config.quota_name, "debt-limit0");
        assert_eq!(config.recreate_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scheduler_name: parked\nrecreate_timeout_secs: 30").unwrap();

        let config = ControllerConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.scheduler_name, "parked");
        assert_eq!(config.recreate_timeout_secs, 30);
        assert_eq!(config.quota_name, "debt-limit0");
        assert_eq!(config.retry_interval_secs, 5);
    }

    #[test]
    fn test_invalid_yaml_values_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "recreate_timeout_secs: 0").unwrap();

        let err = ControllerConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig { .. }));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ControllerConfig::from_yaml_file(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig { .. }));
    }

    #[test]
    fn test_empty_scheduler_name_is_rejected() {
        let config = ControllerConfig {
            scheduler_name: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
