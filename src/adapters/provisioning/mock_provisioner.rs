//! Mock account provisioner.
//!
//! Stands in for the hosting control panel in tests and local runs.
//! Supports:
//! - Error injection (next call or every call)
//! - Artificial latency, to hold a provisioning claim open
//! - Call tracking

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::UserId;
use crate::domain::provisioning::ProvisioningRequest;
use crate::ports::{AccountProvisioner, ProvisionedAccount, ProvisioningError};

/// Recorded provisioning call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionCall {
    pub user_id: UserId,
    pub domain: String,
    pub username: String,
    pub plan: String,
}

/// Mock provisioner.
///
/// # Example
///
/// ```ignore
/// let mock = MockProvisioner::new();
/// mock.fail_next(ProvisioningError::Unavailable("timeout".into()));
///
/// assert!(mock.provision(&request).await.is_err());
/// assert!(mock.provision(&request).await.is_ok());
/// assert_eq!(mock.call_count(), 2);
/// ```
#[derive(Default, Clone)]
pub struct MockProvisioner {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    next_error: Option<ProvisioningError>,
    persistent_error: Option<ProvisioningError>,
    delay: Option<Duration>,
    calls: Vec<ProvisionCall>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Fails the next call only.
    pub fn fail_next(&self, error: ProvisioningError) {
        self.state().next_error = Some(error);
    }

    /// Fails every call until `clear_errors`.
    pub fn fail_always(&self, error: ProvisioningError) {
        self.state().persistent_error = Some(error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.persistent_error = None;
    }

    /// Sleeps for `delay` inside every call.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state().delay = Some(delay);
        self
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<ProvisionCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl AccountProvisioner for MockProvisioner {
    async fn provision(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisionedAccount, ProvisioningError> {
        let username = request.username();
        let delay = {
            let mut state = self.state();
            state.calls.push(ProvisionCall {
                user_id: request.user_id.clone(),
                domain: request.domain.clone(),
                username: username.clone(),
                plan: request.plan.clone(),
            });
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let error = {
            let mut state = self.state();
            state.next_error.take().or_else(|| state.persistent_error.clone())
        };
        if let Some(error) = error {
            tracing::debug!(domain = %request.domain, error = %error, "Mock provisioning failed");
            return Err(error);
        }

        tracing::info!(
            domain = %request.domain,
            username = %username,
            plan = %request.plan,
            "Mock account provisioned"
        );
        Ok(ProvisionedAccount {
            username,
            domain: request.domain.clone(),
            plan: request.plan.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProvisioningRequest {
        ProvisioningRequest {
            user_id: UserId::new("5551999990000").unwrap(),
            domain: "shop.com.br".to_string(),
            contact_email: "owner@shop.com.br".to_string(),
            plan: "Dresbach-Start".to_string(),
        }
    }

    #[tokio::test]
    async fn provisions_account_from_request() {
        let mock = MockProvisioner::new();
        let account = mock.provision(&request()).await.unwrap();

        assert_eq!(account.username, "shop");
        assert_eq!(account.domain, "shop.com.br");
        assert_eq!(account.plan, "Dresbach-Start");
    }

    #[tokio::test]
    async fn tracks_calls() {
        let mock = MockProvisioner::new();
        mock.provision(&request()).await.unwrap();
        mock.provision(&request()).await.unwrap();

        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.calls()[0].username, "shop");

        mock.clear_calls();
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn fail_next_affects_one_call() {
        let mock = MockProvisioner::new();
        mock.fail_next(ProvisioningError::Unavailable("timeout".into()));

        assert!(mock.provision(&request()).await.is_err());
        assert!(mock.provision(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn fail_always_until_cleared() {
        let mock = MockProvisioner::new();
        mock.fail_always(ProvisioningError::Rejected("quota".into()));

        assert!(mock.provision(&request()).await.is_err());
        assert!(mock.provision(&request()).await.is_err());
        mock.clear_errors();
        assert!(mock.provision(&request()).await.is_ok());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let mock = MockProvisioner::new();
        let clone = mock.clone();
        clone.provision(&request()).await.unwrap();
        assert_eq!(mock.call_count(), 1);
    }
}
