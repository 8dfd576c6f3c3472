//! Reconciliation configuration

use deckhand_core::LabelConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{KubeError, Result};
use crate::retry::RetryPolicy;
use crate::rollout::RolloutConfig;

/// Settings shared by every reconciliation
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    /// Label vendor prefix and creator identity
    pub labels: LabelConfig,

    /// Backoff around create, patch, delete and list calls
    pub retry: RetryPolicy,

    /// Rollout polling
    pub rollout: RolloutConfig,
}

impl ReconcileConfig {
    /// Parse from YAML (JSON is valid YAML)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.labels.vendor.is_empty() {
            return Err(KubeError::InvalidConfig("labels.vendor is empty".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(KubeError::InvalidConfig(
                "retry.maxAttempts must be at least 1".into(),
            ));
        }
        if self.retry.min_delay > self.retry.max_delay {
            return Err(KubeError::InvalidConfig(
                "retry.minDelay is larger than retry.maxDelay".into(),
            ));
        }
        if self.rollout.interval.is_zero() {
            return Err(KubeError::InvalidConfig(
                "rollout.interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ReconcileConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ReconcileConfig::default());
        assert_eq!(config.labels.vendor, "deckhand.io");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.rollout.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_partial_config() {
        let yaml = r#"
labels:
  vendor: example.com
retry:
  maxAttempts: 2
  jitter: false
rollout:
  timeout: 30s
"#;
        let config = ReconcileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.labels.vendor, "example.com");
        assert!(config.labels.creator.starts_with("deckhand-core_"));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.min_delay, Duration::from_millis(100));
        assert!(!config.retry.jitter);
        assert_eq!(config.rollout.timeout, Duration::from_secs(30));
        assert_eq!(config.rollout.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_config() {
        let err = ReconcileConfig::from_yaml("retry:\n  maxAttempts: 0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err =
            ReconcileConfig::from_yaml("retry:\n  minDelay: 10s\n  maxDelay: 1s").unwrap_err();
        assert!(err.to_string().contains("minDelay"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rollout:\n  interval: 1s").unwrap();

        let config = ReconcileConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rollout.interval, Duration::from_secs(1));
    }
}
