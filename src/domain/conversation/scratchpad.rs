//! Scratchpad - free-form data collected during a conversation.
//!
//! The engine never interprets scratchpad contents. Handlers own the keys
//! they write (see [`keys`]) and express changes as a [`ScratchpadPatch`]
//! so that the same patch can be re-applied on top of a newer session after
//! an optimistic-concurrency conflict.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Well-known scratchpad keys written by the default script and the
/// provisioning coordinator.
pub mod keys {
    pub const BUSINESS_TYPE: &str = "business_type";
    pub const HAS_SYSTEM: &str = "has_system";
    pub const MAIN_CONCERN: &str = "main_concern";
    pub const INCIDENT_HISTORY: &str = "incident_history";
    pub const REPO_URL: &str = "pre_analysis.repo_url";
    pub const SYSTEM_URL: &str = "pre_analysis.system_url";
    pub const PROBLEM_DESCRIPTION: &str = "pre_analysis.problem_description";
    pub const DOMAIN: &str = "domain";
    pub const DOMAIN_ACTION: &str = "domain_action";
    pub const CONTACT_EMAIL: &str = "contact_email";
    pub const CLIENT_DOCUMENT: &str = "client.document";
    pub const CLIENT_REQUEST: &str = "client.request";
    pub const SUPPORT_REQUEST: &str = "support.request";
    pub const CHECKOUT_REFERENCE: &str = "checkout.reference";
    pub const CHECKOUT_URL: &str = "checkout.url";
    pub const PAYMENT_REFERENCE: &str = "payment_reference";
    pub const PROVISIONED_DOMAIN: &str = "provisioned_domain";
}

/// Key/value data collected during the flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scratchpad(BTreeMap<String, String>);

impl Scratchpad {
    /// Creates an empty scratchpad.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Applies a patch: clear (if requested), then removals, then sets.
    pub fn apply(&mut self, patch: &ScratchpadPatch) {
        if patch.clear {
            self.0.clear();
        }
        for key in &patch.remove {
            self.0.remove(key);
        }
        for (key, value) in &patch.set {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Scratchpad {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A set of changes to apply to a [`Scratchpad`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScratchpadPatch {
    clear: bool,
    remove: BTreeSet<String>,
    set: BTreeMap<String, String>,
}

impl ScratchpadPatch {
    /// An empty patch.
    pub fn none() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.remove.remove(&key);
        self.set.insert(key, value.into());
        self
    }

    /// Removes `key`.
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.set.remove(&key);
        self.remove.insert(key);
        self
    }

    /// Drops every existing entry before the rest of the patch applies.
    pub fn clear(mut self) -> Self {
        self.clear = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.clear && self.remove.is_empty() && self.set.is_empty()
    }
}
