//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `conversation` - States, handlers, the registry, sessions and the engine
//! - `provisioning` - Payment confirmations and the idempotency ledger

pub mod conversation;
pub mod foundation;
pub mod provisioning;
