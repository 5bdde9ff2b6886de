//! Session - the durable per-user conversation record.
//!
//! One canonical type is used everywhere: handlers read its scratchpad,
//! the dispatcher and the provisioning coordinator mutate it, and
//! repositories persist it as a single serialized document.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ConversationState, Scratchpad, Transition};
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::provisioning::ProvisioningLedger;

/// Optimistic-concurrency version of a stored session.
///
/// Version 0 means "never stored"; the first successful save produces 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionVersion(u64);

impl SessionVersion {
    /// Version of a session that has never been persisted.
    pub fn unsaved() -> Self {
        Self(0)
    }

    /// Creates a version from a raw value.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw version number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn is_unsaved(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SessionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Conversation session for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    user_id: UserId,
    state: ConversationState,
    #[serde(default)]
    scratchpad: Scratchpad,
    #[serde(default)]
    version: SessionVersion,
    last_activity: Timestamp,
    #[serde(default)]
    ledger: ProvisioningLedger,
}

impl Session {
    /// A fresh, unsaved session in the initial state.
    pub fn new(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            state: ConversationState::initial(),
            scratchpad: Scratchpad::new(),
            version: SessionVersion::unsaved(),
            last_activity: now,
            ledger: ProvisioningLedger::new(),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn scratchpad(&self) -> &Scratchpad {
        &self.scratchpad
    }

    pub fn version(&self) -> SessionVersion {
        self.version
    }

    pub fn last_activity(&self) -> Timestamp {
        self.last_activity
    }

    pub fn ledger(&self) -> &ProvisioningLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut ProvisioningLedger {
        &mut self.ledger
    }

    /// Returns a copy carrying `version`. Used by repositories when
    /// materializing a stored record.
    pub fn with_version(mut self, version: SessionVersion) -> Self {
        self.version = version;
        self
    }

    /// Returns true if the session has been idle for longer than `ttl_secs`.
    pub fn is_expired(&self, ttl_secs: u64, now: Timestamp) -> bool {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        now.duration_since(&self.last_activity).num_seconds() > ttl
    }

    /// Resets the conversation to the initial state if the session is idle
    /// beyond `ttl_secs`. Returns true if a reset happened.
    ///
    /// Version and ledger are kept: the version is still the one stored,
    /// and processed payment keys must outlive conversation expiry.
    pub fn expire_if_idle(&mut self, ttl_secs: u64, now: Timestamp) -> bool {
        if !self.is_expired(ttl_secs, now) {
            return false;
        }
        self.state = ConversationState::initial();
        self.scratchpad = Scratchpad::new();
        self.last_activity = now;
        true
    }

    /// Applies a handler's transition.
    pub fn apply_transition(&mut self, transition: &Transition, now: Timestamp) {
        self.scratchpad.apply(&transition.patch);
        self.state = transition.next_state;
        self.last_activity = now;
    }

    /// Forces the session back to the initial state, keeping the scratchpad.
    pub fn reset_state(&mut self, now: Timestamp) {
        self.state = ConversationState::initial();
        self.last_activity = now;
    }

    /// Moves to `state` outside of a chat turn (payment-driven transitions).
    pub fn move_to(&mut self, state: ConversationState, now: Timestamp) {
        self.state = state;
        self.last_activity = now;
    }

    /// Applies a patch outside of a chat turn.
    pub fn patch_scratchpad(&mut self, patch: &super::ScratchpadPatch) {
        self.scratchpad.apply(patch);
    }
}
