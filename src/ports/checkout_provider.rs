//! Checkout provider port - creates payment links.
//!
//! The payment provider echoes the request metadata back on the
//! payment-confirmed event, and the returned reference becomes that event's
//! idempotency key.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::provisioning::CheckoutRequest;

/// A payment link ready to send to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLink {
    /// Provider reference of the checkout session.
    pub reference: String,
    pub url: String,
}

/// Errors raised while creating a payment link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("Checkout rejected: {0}")]
    Rejected(String),
}

impl From<CheckoutError> for DomainError {
    fn from(err: CheckoutError) -> Self {
        DomainError::new(ErrorCode::CheckoutFailed, err.to_string())
    }
}

/// Port for creating payment links.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutLink, CheckoutError>;
}
