//! Session store configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

pub(crate) const SECS_PER_DAY: u64 = 86_400;

/// Session lifetime and concurrency settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle seconds after which a conversation restarts from the main menu
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Compare-and-save attempts per chat turn
    #[serde(default = "default_max_save_attempts")]
    pub max_save_attempts: u32,

    /// Run the background reaper
    #[serde(default)]
    pub reaper_enabled: bool,

    /// Idle days after which the reaper deletes a session and its ledger
    #[serde(default = "default_purge_after_days")]
    pub purge_after_days: u32,

    /// Seconds between reaper passes
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

impl SessionConfig {
    /// Get reaper interval as Duration
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    /// How long an idle session (and its provisioning ledger) is kept
    pub fn retention_secs(&self) -> u64 {
        u64::from(self.purge_after_days) * SECS_PER_DAY
    }

    /// Validate session configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ttl_secs == 0 {
            return Err(ValidationError::InvalidSessionTtl);
        }
        if self.max_save_attempts == 0 {
            return Err(ValidationError::InvalidSaveAttempts("session.max_save_attempts"));
        }
        if self.retention_secs() <= self.ttl_secs {
            return Err(ValidationError::RetentionShorterThanTtl);
        }
        if self.reaper_interval_secs == 0 {
            return Err(ValidationError::InvalidReaperInterval);
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_save_attempts: default_max_save_attempts(),
            reaper_enabled: false,
            purge_after_days: default_purge_after_days(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_save_attempts() -> u32 {
    3
}

fn default_purge_after_days() -> u32 {
    30
}

fn default_reaper_interval_secs() -> u64 {
    3600
}
