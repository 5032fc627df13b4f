//! Scheduler configuration (strand.toml)
//!
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! compute_workers = 2
//! stack_size = 131072
//! max_tasks = 512
//! idle = "poll"
//! idle_backoff_us = 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default usable stack size per task (64 KiB)
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest accepted task stack
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Upper bound on compute executors
pub const MAX_COMPUTE_WORKERS: usize = 2;

/// Default idle wait before a worker re-checks its queue
pub const DEFAULT_IDLE_BACKOFF_US: u64 = 100;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("{0}")]
    Invalid(String),
}

/// What an executor does when its queue is empty
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdlePolicy {
    /// Wait on the queue's condition variable, bounded by the backoff
    #[default]
    Park,
    /// Sleep for the backoff, then poll again
    Poll,
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Number of compute executors (1 or 2)
    pub compute_workers: usize,

    /// Usable stack bytes per task, rounded up to whole pages
    pub stack_size: usize,

    /// Maximum number of live tasks (None = unlimited)
    pub max_tasks: Option<usize>,

    /// Idle behaviour for all executors
    pub idle: IdlePolicy,

    /// Idle wait in microseconds
    pub idle_backoff_us: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            compute_workers: 1,
            stack_size: DEFAULT_STACK_SIZE,
            max_tasks: None,
            idle: IdlePolicy::Park,
            idle_backoff_us: DEFAULT_IDLE_BACKOFF_US,
        }
    }
}

impl SchedulerConfig {
    /// Set the number of compute executors
    pub fn with_compute_workers(mut self, count: usize) -> Self {
        self.compute_workers = count;
        self
    }

    /// Set the per-task stack size
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Cap the number of live tasks
    pub fn with_max_tasks(mut self, limit: usize) -> Self {
        self.max_tasks = Some(limit);
        self
    }

    /// Set the idle policy
    pub fn with_idle(mut self, idle: IdlePolicy) -> Self {
        self.idle = idle;
        self
    }

    /// Set the idle wait
    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff_us = backoff.as_micros().min(u64::MAX as u128) as u64;
        self
    }

    /// Idle wait as a `Duration`
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_micros(self.idle_backoff_us)
    }

    /// Check that every value is in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compute_workers == 0 || self.compute_workers > MAX_COMPUTE_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "compute_workers must be between 1 and {}, got {}",
                MAX_COMPUTE_WORKERS, self.compute_workers
            )));
        }

        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "stack_size must be at least {} bytes, got {}",
                MIN_STACK_SIZE, self.stack_size
            )));
        }

        if self.max_tasks == Some(0) {
            return Err(ConfigError::Invalid(
                "max_tasks must be greater than zero".to_string(),
            ));
        }

        if self.idle_backoff_us == 0 {
            return Err(ConfigError::Invalid(
                "idle_backoff_us must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.compute_workers, 1);
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(config.idle, IdlePolicy::Park);
        assert_eq!(config.idle_backoff(), Duration::from_micros(100));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = SchedulerConfig::from_toml_str("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn test_parse_full_toml() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            compute_workers = 2
            stack_size = 131072
            max_tasks = 8
            idle = "poll"
            idle_backoff_us = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.compute_workers, 2);
        assert_eq!(config.stack_size, 131072);
        assert_eq!(config.max_tasks, Some(8));
        assert_eq!(config.idle, IdlePolicy::Poll);
        assert_eq!(config.idle_backoff_us, 250);
    }

    #[test]
    fn test_rejects_three_compute_workers() {
        let err = SchedulerConfig::default()
            .with_compute_workers(3)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("compute_workers"));
    }

    #[test]
    fn test_rejects_zero_compute_workers() {
        let result = SchedulerConfig::from_toml_str("compute_workers = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_tiny_stack() {
        let err = SchedulerConfig::default()
            .with_stack_size(1024)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("stack_size"));
    }

    #[test]
    fn test_rejects_zero_task_limit() {
        assert!(SchedulerConfig::default().with_max_tasks(0).validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_field() {
        let result = SchedulerConfig::from_toml_str("workers = 2");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.toml");
        std::fs::write(&path, "compute_workers = 2\nidle = \"park\"\n").unwrap();

        let config = SchedulerConfig::load(&path).unwrap();
        assert_eq!(config.compute_workers, 2);
        assert_eq!(config.idle, IdlePolicy::Park);
    }

    #[test]
    fn test_load_missing_file() {
        let result = SchedulerConfig::load("/nonexistent/strand.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_builder_round_trip_through_toml() {
        let config = SchedulerConfig::default()
            .with_compute_workers(2)
            .with_max_tasks(16)
            .with_idle(IdlePolicy::Poll)
            .with_idle_backoff(Duration::from_millis(1));
        let text = toml::to_string(&config).unwrap();
        assert_eq!(SchedulerConfig::from_toml_str(&text).unwrap(), config);
    }
}
