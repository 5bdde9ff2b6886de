//! Conversation command handlers.

mod dispatch_message;

pub use dispatch_message::{
    DispatchMessageCommand, DispatchMessageHandler, DispatchMessageResult, DispatchOutcome,
    CHECKOUT_FAILURE_REPLY, TRANSIENT_FAILURE_REPLY,
};
