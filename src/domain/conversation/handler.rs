//! State handlers.
//!
//! A handler computes the reply, the next state and a scratchpad patch for
//! one conversation state. Handlers are synchronous and perform no I/O;
//! persistence and message delivery happen around them. A handler that
//! needs an external call requests it as an [`Effect`], which the dispatch
//! layer runs before saving the turn.

use super::{ConversationState, Scratchpad, ScratchpadPatch};
use crate::domain::foundation::UserId;

/// External call a handler requests alongside its transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Create a payment link for `domain` and append it to the reply.
    StartCheckout {
        domain: String,
        contact_email: String,
    },
}

/// Outcome of handling one inbound message in one state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Text to send back to the user.
    pub reply: String,
    /// State the session moves to.
    pub next_state: ConversationState,
    /// Changes to the session scratchpad.
    pub patch: ScratchpadPatch,
    /// External call to run before the transition is saved.
    pub effect: Option<Effect>,
}

impl Transition {
    /// Moves to `next_state` with the given reply.
    pub fn to(next_state: ConversationState, reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            next_state,
            patch: ScratchpadPatch::none(),
            effect: None,
        }
    }

    /// Stays in `current` and replies (typically a re-prompt).
    pub fn stay(current: ConversationState, reply: impl Into<String>) -> Self {
        Self::to(current, reply)
    }

    /// Attaches a scratchpad patch.
    pub fn with_patch(mut self, patch: ScratchpadPatch) -> Self {
        self.patch = patch;
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Capability bound to one [`ConversationState`] in the registry.
pub trait StateHandler: Send + Sync {
    /// Computes the transition for `input` given the current scratchpad.
    fn handle(&self, user_id: &UserId, scratchpad: &Scratchpad, input: &str) -> Transition;
}

impl<F> StateHandler for F
where
    F: Fn(&UserId, &Scratchpad, &str) -> Transition + Send + Sync,
{
    fn handle(&self, user_id: &UserId, scratchpad: &Scratchpad, input: &str) -> Transition {
        self(user_id, scratchpad, input)
    }
}
