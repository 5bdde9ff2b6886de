//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid log level directive: {0}")]
    InvalidLogLevel(String),

    #[error("Session TTL must be greater than zero")]
    InvalidSessionTtl,

    #[error("{0} must allow at least one save attempt")]
    InvalidSaveAttempts(&'static str),

    #[error("Session retention must exceed the session TTL")]
    RetentionShorterThanTtl,

    #[error("Reaper interval must be greater than zero")]
    InvalidReaperInterval,

    #[error("Provisioning claim lease must be greater than zero")]
    InvalidClaimLease,

    #[error("Provisioning timeout must be greater than zero and shorter than the claim lease")]
    InvalidProvisionTimeout,

    #[error("Session retention must exceed the payment redelivery window and the claim lease")]
    RetentionShorterThanRedelivery,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,
}
