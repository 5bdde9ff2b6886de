//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `DRESBACH_ASSISTANT` prefix and nested values use double underscores as separators.
//! Every section has defaults, so an empty environment yields a working
//! in-memory setup.
//!
//! # Example
//!
//! ```no_run
//! use dresbach_assistant::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Sessions expire after {}s", config.session.ttl_secs);
//! ```

mod database;
mod error;
mod provisioning;
mod runtime;
mod session;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use provisioning::ProvisioningConfig;
pub use runtime::{Environment, LogFormat, RuntimeConfig};
pub use session::SessionConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Environment and logging
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Session TTL, retries and reaper
    #[serde(default)]
    pub session: SessionConfig,

    /// Optional PostgreSQL store
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Provisioning coordinator
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `DRESBACH_ASSISTANT` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `DRESBACH_ASSISTANT__SESSION__TTL_SECS=900` -> `session.ttl_secs = 900`
    /// - `DRESBACH_ASSISTANT__DATABASE__URL=...` -> `database.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("DRESBACH_ASSISTANT")
                    .separator("__"),
            )
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
        self.runtime.validate()?;
        self.session.validate()?;
        self.database.validate()?;
        self.provisioning.validate()?;
        self.validate_retention()?;
        Ok(())
    }

    /// The reaper must not delete a ledger while the payment provider may
    /// still redeliver one of its events, or while a claim is still leased.
    fn validate_retention(&self) -> Result<(), ValidationError> {
        let retention = self.session.retention_secs();
        if retention <= self.provisioning.redelivery_window_secs()
            || retention <= self.provisioning.claim_lease_secs
        {
            return Err(ValidationError::RetentionShorterThanRedelivery);
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.runtime.is_production()
    }
}
