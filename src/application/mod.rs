//! Application layer - Commands and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Chat turns and payment events are the two ingress paths; both mutate
//! sessions only through compare-and-save.

pub mod handlers;

pub use handlers::{
    // Conversation
    DispatchMessageCommand, DispatchMessageHandler, DispatchMessageResult, DispatchOutcome,
    // Provisioning
    CoordinatorError, HandlePaymentConfirmedCommand, HandlePaymentConfirmedHandler,
    HandlePaymentConfirmedResult, ProvisioningSettings,
};
