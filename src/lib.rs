//! Dresbach Assistant - Conversation state engine for a hosting sales chat.
//!
//! Inbound chat messages drive a per-user session through a registry of
//! scripted states. Payment-confirmed events provision hosting accounts
//! exactly once per idempotency key, even under redelivery and concurrent
//! chat traffic.

pub mod adapters;
pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
