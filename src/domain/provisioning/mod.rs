//! Provisioning domain - checkout requests, payment confirmations and the
//! idempotency ledger that keeps account creation at most once per payment
//! event.

mod checkout;
mod confirmation;
mod ledger;

pub use checkout::{metadata, CheckoutRequest};
pub use confirmation::{normalize_domain, validate_email, PaymentConfirmation, ProvisioningRequest};
pub use ledger::{LedgerStatus, ProvisioningClaim, ProvisioningLedger, ProvisioningRecord};
