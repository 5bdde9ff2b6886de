//! State Registry - maps each conversation state to its handler.
//!
//! Registration is strict: binding a second handler to a state that already
//! has one fails with [`RegistryError::DuplicateHandler`] and leaves the
//! existing binding in place. Lookups of unbound states return
//! [`RegistryError::HandlerNotFound`], which the dispatcher recovers from.
//!
//! # Example
//!
//! ```
//! use dresbach_assistant::domain::conversation::{
//!     ConversationState, Scratchpad, StateRegistry, Transition,
//! };
//! use dresbach_assistant::domain::foundation::UserId;
//!
//! fn greet(_: &UserId, _: &Scratchpad, _: &str) -> Transition {
//!     Transition::stay(ConversationState::Initial, "Hello!")
//! }
//!
//! let mut registry = StateRegistry::new();
//! registry.register(ConversationState::Initial, greet).unwrap();
//!
//! assert!(registry.lookup(ConversationState::Initial).is_ok());
//! assert!(registry.lookup(ConversationState::Support).is_err());
//! ```

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::{ConversationState, StateHandler};
use crate::domain::foundation::{DomainError, ErrorCode, UserId};

/// Errors raised by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("State {0} already has a registered handler")]
    DuplicateHandler(ConversationState),

    #[error("No handler registered for state {0}")]
    HandlerNotFound(ConversationState),
}

impl From<RegistryError> for DomainError {
    fn from(err: RegistryError) -> Self {
        let code = match err {
            RegistryError::DuplicateHandler(_) => ErrorCode::DuplicateHandler,
            RegistryError::HandlerNotFound(_) => ErrorCode::HandlerNotFound,
        };
        DomainError::new(code, err.to_string())
    }
}

/// Registry of state handlers.
#[derive(Clone, Default)]
pub struct StateRegistry {
    handlers: HashMap<ConversationState, Arc<dyn StateHandler>>,
}

impl StateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `state`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateHandler` if `state` is already bound.
    pub fn register<H>(&mut self, state: ConversationState, handler: H) -> Result<(), RegistryError>
    where
        H: StateHandler + 'static,
    {
        self.register_arc(state, Arc::new(handler))
    }

    /// Binds an already shared handler to `state`.
    pub fn register_arc(
        &mut self,
        state: ConversationState,
        handler: Arc<dyn StateHandler>,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&state) {
            return Err(RegistryError::DuplicateHandler(state));
        }
        self.handlers.insert(state, handler);
        Ok(())
    }

    /// Returns the handler bound to `state`.
    pub fn lookup(&self, state: ConversationState) -> Result<&dyn StateHandler, RegistryError> {
        self.handlers
            .get(&state)
            .map(|h| h.as_ref())
            .ok_or(RegistryError::HandlerNotFound(state))
    }

    pub fn contains(&self, state: ConversationState) -> bool {
        self.handlers.contains_key(&state)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered states in declaration order.
    pub fn registered_states(&self) -> Vec<ConversationState> {
        let mut states: Vec<_> = self.handlers.keys().copied().collect();
        states.sort();
        states
    }

    /// States of the enumeration with no bound handler.
    pub fn missing_states(&self) -> Vec<ConversationState> {
        ConversationState::ALL
            .into_iter()
            .filter(|s| !self.handlers.contains_key(s))
            .collect()
    }

    /// Explores the script from the initial state by feeding every handler
    /// the given sample inputs, returning every state reached.
    ///
    /// Used to check that no reachable state lacks a handler: an unbound
    /// state shows up in the result but not in `registered_states`.
    pub fn reachable_states(
        &self,
        user: &UserId,
        inputs: &[&str],
    ) -> BTreeSet<ConversationState> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([(ConversationState::initial(), super::Scratchpad::new())]);
        seen.insert(ConversationState::initial());

        while let Some((state, pad)) = queue.pop_front() {
            let Ok(handler) = self.lookup(state) else {
                continue;
            };
            for input in inputs {
                let transition = handler.handle(user, &pad, input);
                if seen.insert(transition.next_state) {
                    let mut next_pad = pad.clone();
                    next_pad.apply(&transition.patch);
                    queue.push_back((transition.next_state, next_pad));
                }
            }
        }
        seen
    }
}

impl fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRegistry")
            .field("states", &self.registered_states())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::{Scratchpad, Transition};

    fn to_start(_: &UserId, _: &Scratchpad, _: &str) -> Transition {
        Transition::to(ConversationState::TechOpsStart, "start")
    }

    fn back_home(_: &UserId, _: &Scratchpad, _: &str) -> Transition {
        Transition::to(ConversationState::Initial, "home")
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = StateRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.missing_states().len(), ConversationState::ALL.len());
    }

    #[test]
    fn lookup_returns_registered_handler() {
        let mut registry = StateRegistry::new();
        registry.register(ConversationState::Initial, to_start).unwrap();

        let user = UserId::new("u1").unwrap();
        let handler = registry.lookup(ConversationState::Initial).unwrap();
        let transition = handler.handle(&user, &Scratchpad::new(), "1");

        assert_eq!(transition.next_state, ConversationState::TechOpsStart);
    }

    #[test]
    fn lookup_of_unbound_state_is_not_found() {
        let registry = StateRegistry::new();
        let result = registry.lookup(ConversationState::Support);
        assert_eq!(
            result.err(),
            Some(RegistryError::HandlerNotFound(ConversationState::Support))
        );
    }

    #[test]
    fn duplicate_registration_fails_and_keeps_first_binding() {
        let mut registry = StateRegistry::new();
        registry.register(ConversationState::Initial, to_start).unwrap();

        let result = registry.register(ConversationState::Initial, back_home);

        assert_eq!(
            result,
            Err(RegistryError::DuplicateHandler(ConversationState::Initial))
        );
        let user = UserId::new("u1").unwrap();
        let t = registry
            .lookup(ConversationState::Initial)
            .unwrap()
            .handle(&user, &Scratchpad::new(), "");
        assert_eq!(t.next_state, ConversationState::TechOpsStart);
    }

    #[test]
    fn registered_states_are_sorted() {
        let mut registry = StateRegistry::new();
        registry.register(ConversationState::Support, back_home).unwrap();
        registry.register(ConversationState::Initial, to_start).unwrap();

        assert_eq!(
            registry.registered_states(),
            vec![ConversationState::Initial, ConversationState::Support]
        );
    }

    #[test]
    fn reachability_reports_unbound_targets() {
        let mut registry = StateRegistry::new();
        registry.register(ConversationState::Initial, to_start).unwrap();

        let user = UserId::new("5551999990000").unwrap();
        let reachable = registry.reachable_states(&user, &["x"]);

        assert!(reachable.contains(&ConversationState::TechOpsStart));
        assert!(!registry.contains(ConversationState::TechOpsStart));
    }

    #[test]
    fn registry_error_maps_to_domain_code() {
        let err: DomainError = RegistryError::HandlerNotFound(ConversationState::Support).into();
        assert_eq!(err.code, ErrorCode::HandlerNotFound);
    }
}
