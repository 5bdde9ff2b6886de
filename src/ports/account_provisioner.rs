//! Account provisioner port - creates hosting accounts.
//!
//! The hosting control panel client lives behind this port. The coordinator
//! guarantees at most one call per payment event; implementations need not
//! deduplicate themselves.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::provisioning::ProvisioningRequest;

/// Account created by the provisioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedAccount {
    pub username: String,
    pub domain: String,
    pub plan: String,
}

/// Errors raised while creating an account.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    /// The control panel could not be reached or timed out.
    #[error("Provisioning backend unavailable: {0}")]
    Unavailable(String),

    /// The control panel refused the request.
    #[error("Provisioning rejected: {0}")]
    Rejected(String),

    /// The username is already taken on the server.
    #[error("Account '{username}' already exists")]
    AccountExists { username: String },
}

impl ProvisioningError {
    /// Whether a later redelivery of the same payment event may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisioningError::Unavailable(_))
    }
}

impl From<ProvisioningError> for DomainError {
    fn from(err: ProvisioningError) -> Self {
        DomainError::new(ErrorCode::ProvisioningFailed, err.to_string())
    }
}

/// Port for creating hosting accounts.
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    /// Creates the account described by `request`.
    async fn provision(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisionedAccount, ProvisioningError>;
}
