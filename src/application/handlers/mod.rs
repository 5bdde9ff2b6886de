//! Application handlers.
//!
//! Command handlers that orchestrate domain operations over the ports.

pub mod conversation;
pub mod provisioning;

pub use conversation::{
    DispatchMessageCommand, DispatchMessageHandler, DispatchMessageResult, DispatchOutcome,
};
pub use provisioning::{
    CoordinatorError, HandlePaymentConfirmedCommand, HandlePaymentConfirmedHandler,
    HandlePaymentConfirmedResult, ProvisioningSettings,
};
