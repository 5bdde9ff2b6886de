//! Provisioning coordinator configuration

use serde::Deserialize;

use super::error::ValidationError;
use super::session::SECS_PER_DAY;
use crate::application::ProvisioningSettings;

/// Payment-driven provisioning settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Hosting plan passed to the control panel
    #[serde(default = "default_plan")]
    pub plan: String,

    /// Seconds a claim blocks concurrent deliveries of the same payment event
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,

    /// Upper bound on one control panel call, capped below the claim lease
    #[serde(default = "default_provision_timeout_secs")]
    pub provision_timeout_secs: u64,

    /// Days the payment provider keeps redelivering an unacknowledged event.
    /// Sessions must be retained longer so the ledger still answers.
    #[serde(default = "default_redelivery_window_days")]
    pub redelivery_window_days: u32,

    /// Compare-and-save attempts per coordinator phase
    #[serde(default = "default_max_save_attempts")]
    pub max_save_attempts: u32,

    /// Send the user a chat message once the account exists
    #[serde(default = "default_notify_user")]
    pub notify_user: bool,
}

impl ProvisioningConfig {
    /// Coordinator settings derived from this section
    pub fn settings(&self) -> ProvisioningSettings {
        ProvisioningSettings {
            plan: self.plan.clone(),
            claim_lease_secs: self.claim_lease_secs,
            provision_timeout_secs: self.provision_timeout_secs,
            max_save_attempts: self.max_save_attempts,
        }
    }

    /// Redelivery window in seconds
    pub fn redelivery_window_secs(&self) -> u64 {
        u64::from(self.redelivery_window_days) * SECS_PER_DAY
    }

    /// Validate provisioning configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.plan.trim().is_empty() {
            return Err(ValidationError::MissingRequired("provisioning.plan"));
        }
        if self.claim_lease_secs == 0 {
            return Err(ValidationError::InvalidClaimLease);
        }
        if self.provision_timeout_secs == 0 || self.provision_timeout_secs >= self.claim_lease_secs {
            return Err(ValidationError::InvalidProvisionTimeout);
        }
        if self.max_save_attempts == 0 {
            return Err(ValidationError::InvalidSaveAttempts(
                "provisioning.max_save_attempts",
            ));
        }
        Ok(())
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            plan: default_plan(),
            claim_lease_secs: default_claim_lease_secs(),
            provision_timeout_secs: default_provision_timeout_secs(),
            redelivery_window_days: default_redelivery_window_days(),
            max_save_attempts: default_max_save_attempts(),
            notify_user: default_notify_user(),
        }
    }
}

fn default_plan() -> String {
    "Dresbach-Start".to_string()
}

fn default_claim_lease_secs() -> u64 {
    300
}

fn default_provision_timeout_secs() -> u64 {
    120
}

fn default_redelivery_window_days() -> u32 {
    3
}

fn default_max_save_attempts() -> u32 {
    3
}

fn default_notify_user() -> bool {
    true
}
