//! Payment confirmation and the provisioning request derived from it.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{IdempotencyKey, UserId, ValidationError};

/// A payment-confirmed event, already stripped of its wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub idempotency_key: IdempotencyKey,
    pub user_id: UserId,
    pub domain: String,
    pub contact_email: String,
}

impl PaymentConfirmation {
    /// Builds a confirmation, validating the provisioning parameters.
    ///
    /// The domain is lower-cased and trimmed.
    pub fn new(
        idempotency_key: IdempotencyKey,
        user_id: UserId,
        domain: impl Into<String>,
        contact_email: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let domain = normalize_domain(&domain.into())?;
        let contact_email = contact_email.into().trim().to_string();
        validate_email(&contact_email)?;
        Ok(Self {
            idempotency_key,
            user_id,
            domain,
            contact_email,
        })
    }

    /// The request handed to the provisioning collaborator.
    pub fn to_request(&self, plan: impl Into<String>) -> ProvisioningRequest {
        ProvisioningRequest {
            user_id: self.user_id.clone(),
            domain: self.domain.clone(),
            contact_email: self.contact_email.clone(),
            plan: plan.into(),
        }
    }
}

/// Parameters for creating a hosting account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    pub user_id: UserId,
    pub domain: String,
    pub contact_email: String,
    pub plan: String,
}

impl ProvisioningRequest {
    /// Account username derived from the domain.
    ///
    /// Takes the first label, keeps ASCII alphanumerics, lower-cases and
    /// truncates to 8 characters. Falls back to `"user"` when nothing is left.
    pub fn username(&self) -> String {
        let first_label = self.domain.split('.').next().unwrap_or_default();
        let username: String = first_label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .take(8)
            .collect();
        if username.is_empty() {
            "user".to_string()
        } else {
            username
        }
    }
}

/// Lower-cases and checks the rough shape of a domain name.
pub fn normalize_domain(raw: &str) -> Result<String, ValidationError> {
    let domain = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return Err(ValidationError::empty_field("domain"));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(ValidationError::invalid_format("domain", "missing top-level domain"));
    }
    let label_ok = |label: &&str| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !labels.iter().all(label_ok) {
        return Err(ValidationError::invalid_format("domain", "invalid label"));
    }
    Ok(domain)
}

/// Checks the rough shape of an e-mail address.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::empty_field("contact_email"));
    }
    match email.split_once('@') {
        Some((local, host))
            if !local.is_empty() && host.contains('.') && !email.contains(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(ValidationError::invalid_format(
            "contact_email",
            "expected name@host",
        )),
    }
}
