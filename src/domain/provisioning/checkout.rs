//! Checkout request raised when a conversation reaches payment, and the
//! metadata contract that ties the later payment event back to it.

use std::collections::BTreeMap;

use super::{normalize_domain, validate_email, PaymentConfirmation};
use crate::domain::foundation::{IdempotencyKey, UserId, ValidationError};

/// Metadata keys attached to a checkout and echoed back on the payment event.
pub mod metadata {
    pub const USER_ID: &str = "user_id";
    pub const DOMAIN: &str = "domain";
    pub const CONTACT_EMAIL: &str = "contact_email";
}

/// Parameters for creating a payment link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub domain: String,
    pub contact_email: String,
}

impl CheckoutRequest {
    pub fn new(
        user_id: UserId,
        domain: &str,
        contact_email: &str,
    ) -> Result<Self, ValidationError> {
        let domain = normalize_domain(domain)?;
        let contact_email = contact_email.trim().to_string();
        validate_email(&contact_email)?;
        Ok(Self {
            user_id,
            domain,
            contact_email,
        })
    }

    /// Metadata to attach to the checkout.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (metadata::USER_ID.to_string(), self.user_id.to_string()),
            (metadata::DOMAIN.to_string(), self.domain.clone()),
            (metadata::CONTACT_EMAIL.to_string(), self.contact_email.clone()),
        ])
    }
}

impl PaymentConfirmation {
    /// Rebuilds a confirmation from the checkout metadata carried by a
    /// payment event. `idempotency_key` is the checkout reference.
    pub fn from_checkout_metadata(
        idempotency_key: IdempotencyKey,
        fields: &BTreeMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let field = |name: &'static str| {
            fields
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| ValidationError::empty_field(name))
        };
        let user_id = UserId::new(field(metadata::USER_ID)?)?;
        Self::new(
            idempotency_key,
            user_id,
            field(metadata::DOMAIN)?,
            field(metadata::CONTACT_EMAIL)?,
        )
    }
}
