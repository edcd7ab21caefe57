//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `COBUY__` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use cobuy::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Polling every {:?}", config.worker.poll_interval());
//! ```

mod cycles;
mod database;
mod error;
mod worker;

pub use cycles::CycleConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use worker::WorkerConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Contains all configuration sections for the cobuy worker.
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Cycle lifecycle policy (windows, minimums, suspension)
    #[serde(default)]
    pub cycles: CycleConfig,

    /// Deadline worker loop configuration
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `COBUY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `COBUY__DATABASE__URL=...` -> `database.url = ...`
    /// - `COBUY__CYCLES__COLLECTING_HOURS=6` -> `cycles.collecting_hours = 6`
    /// - `COBUY__WORKER__POLL_INTERVAL_SECS=10` -> `worker.poll_interval_secs = 10`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default().prefix("COBUY").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.cycles.validate()?;
        self.worker.validate()?;
        Ok(())
    }
}
