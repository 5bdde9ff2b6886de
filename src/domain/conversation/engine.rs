//! Conversation Engine - one pure conversation step.
//!
//! The engine looks up the handler for the session's current state, runs it
//! and applies the resulting transition to the session. It never touches
//! storage; the dispatch command handler wraps it with load/compare-and-save
//! and retries.

use super::{ConversationState, Effect, Session, StateRegistry};
use crate::domain::foundation::Timestamp;

/// Reply used when the current state has no handler or the handler
/// produced no text.
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Sorry, something went wrong on our side. Let's start over from the main menu.";

/// How a step was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// The registered handler ran.
    Handled,
    /// No handler was bound to the state; the session was reset.
    HandlerMissing,
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub reply: String,
    pub from: ConversationState,
    pub to: ConversationState,
    pub kind: StepKind,
    /// External call requested by the handler, not yet run.
    pub effect: Option<Effect>,
}

/// Applies handler transitions to sessions.
#[derive(Debug, Clone)]
pub struct ConversationEngine {
    registry: StateRegistry,
    fallback_reply: String,
}

impl ConversationEngine {
    pub fn new(registry: StateRegistry) -> Self {
        Self {
            registry,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }

    /// Overrides the fallback reply.
    pub fn with_fallback_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = reply.into();
        self
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn fallback_reply(&self) -> &str {
        &self.fallback_reply
    }

    /// Runs the handler for the session's state against `input` and
    /// applies the transition to `session`.
    ///
    /// Input is passed through untouched, including empty text.
    pub fn step(&self, session: &mut Session, input: &str, now: Timestamp) -> Step {
        let from = session.state();
        match self.registry.lookup(from) {
            Ok(handler) => {
                let mut transition = handler.handle(session.user_id(), session.scratchpad(), input);
                if transition.reply.trim().is_empty() {
                    tracing::warn!(
                        user_id = %session.user_id(),
                        state = %from,
                        "Handler produced an empty reply, using fallback text"
                    );
                    transition.reply = self.fallback_reply.clone();
                }
                session.apply_transition(&transition, now);
                Step {
                    reply: transition.reply,
                    from,
                    to: session.state(),
                    kind: StepKind::Handled,
                    effect: transition.effect,
                }
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %session.user_id(),
                    state = %from,
                    error = %err,
                    "No handler for state, resetting conversation"
                );
                session.reset_state(now);
                Step {
                    reply: self.fallback_reply.clone(),
                    from,
                    to: session.state(),
                    kind: StepKind::HandlerMissing,
                    effect: None,
                }
            }
        }
    }
}
