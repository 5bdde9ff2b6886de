//! Payment-driven provisioning command handlers.

mod handle_payment_confirmed;

pub use handle_payment_confirmed::{
    CoordinatorError, HandlePaymentConfirmedCommand, HandlePaymentConfirmedHandler,
    HandlePaymentConfirmedResult, ProvisioningSettings,
};
