//! Deadline worker configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Configuration for the deadline worker loop.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between polls for due cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum due cycles processed per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl WorkerConfig {
    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Validate worker configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_secs == 0 {
            return Err(ValidationError::InvalidPollInterval);
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.batch_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_interval_duration() {
        let config = WorkerConfig {
            poll_interval_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = WorkerConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let config = WorkerConfig {
            batch_size: 5000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
