//! Mock checkout provider.
//!
//! Issues `cs_mock_*` references with a fake checkout URL. Used in tests and
//! outside production when no payment provider is wired in.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::provisioning::CheckoutRequest;
use crate::ports::{CheckoutError, CheckoutLink, CheckoutProvider};

/// Mock checkout provider with error injection and call tracking.
#[derive(Default, Clone)]
pub struct MockCheckoutProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    next_link: Option<CheckoutLink>,
    next_error: Option<CheckoutError>,
    calls: Vec<CheckoutRequest>,
}

impl MockCheckoutProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `link` from the next call instead of a generated one.
    pub fn set_next_link(&self, link: CheckoutLink) {
        self.state().next_link = Some(link);
    }

    /// Fails the next call only.
    pub fn fail_next(&self, error: CheckoutError) {
        self.state().next_error = Some(error);
    }

    pub fn calls(&self) -> Vec<CheckoutRequest> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }
}

#[async_trait]
impl CheckoutProvider for MockCheckoutProvider {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutLink, CheckoutError> {
        let mut state = self.state();
        state.calls.push(request.clone());
        if let Some(err) = state.next_error.take() {
            return Err(err);
        }
        Ok(state.next_link.take().unwrap_or_else(|| {
            let id = Uuid::new_v4().simple().to_string();
            let reference = format!("cs_mock_{}", &id[..8]);
            CheckoutLink {
                url: format!("https://checkout.example.com/c/pay/{}", reference),
                reference,
            }
        }))
    }
}
