//! Conversation domain module.
//!
//! Per-user sessions driven by a registry of pure state handlers. Each
//! inbound message runs exactly one handler, whose transition is applied
//! to the session by the [`ConversationEngine`].

mod engine;
mod handler;
mod registry;
mod scratchpad;
pub mod script;
mod session;
mod state;

pub use engine::{ConversationEngine, Step, StepKind, DEFAULT_FALLBACK_REPLY};
pub use handler::{Effect, StateHandler, Transition};
pub use registry::{RegistryError, StateRegistry};
pub use scratchpad::{keys, Scratchpad, ScratchpadPatch};
pub use session::{Session, SessionVersion};
pub use state::ConversationState;
