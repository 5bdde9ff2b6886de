//! Provisioning ledger - per-session idempotency record.
//!
//! The ledger lives on the [`Session`](crate::domain::conversation::Session)
//! so that it is read and written through the same `compare_and_save` as
//! the conversation state. A key moves through three kinds of entries:
//!
//! - a **claim**, written before the provisioning collaborator is called,
//!   carrying a random token and a lease;
//! - a **provisioned** entry, written as soon as the collaborator returned
//!   an account. It has no lease and never lapses;
//! - a **record**, written together with the conversation update. A
//!   recorded key is never provisioned again.
//!
//! A claim whose lease ran out is **stale**: the outcome of the call it
//! guarded is unknown, so it is never taken over automatically. Only
//! [`ProvisioningLedger::clear_stale`] (an operator action) frees the key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::foundation::{ClaimToken, IdempotencyKey, Timestamp};

/// Proof that provisioning for one payment event completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRecord {
    pub idempotency_key: IdempotencyKey,
    pub domain: String,
    pub username: String,
    pub provisioned_at: Timestamp,
}

/// An in-flight provisioning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningClaim {
    pub token: ClaimToken,
    pub claimed_at: Timestamp,
    pub lease_expires_at: Timestamp,
}

impl ProvisioningClaim {
    /// Returns true while the lease is still held at `now`.
    pub fn is_live(&self, now: Timestamp) -> bool {
        now.is_before(&self.lease_expires_at)
    }
}

/// Where a key stands in the ledger at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStatus {
    /// Never seen, or a failed attempt released its claim.
    Fresh,
    /// An attempt holds a live claim.
    InFlight(ProvisioningClaim),
    /// A claim outlived its lease without a result.
    Stale(ProvisioningClaim),
    /// The account exists but the conversation has not been moved yet.
    Provisioned(ProvisioningRecord),
    /// Provisioning completed and the conversation was updated.
    Processed(ProvisioningRecord),
}

/// Idempotency ledger for payment-driven provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningLedger {
    #[serde(default)]
    processed: BTreeMap<IdempotencyKey, ProvisioningRecord>,
    #[serde(default)]
    provisioned: BTreeMap<IdempotencyKey, ProvisioningRecord>,
    #[serde(default)]
    claims: BTreeMap<IdempotencyKey, ProvisioningClaim>,
}

impl ProvisioningLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of `key` at `now`.
    pub fn status(&self, key: &IdempotencyKey, now: Timestamp) -> LedgerStatus {
        if let Some(record) = self.processed.get(key) {
            return LedgerStatus::Processed(record.clone());
        }
        if let Some(record) = self.provisioned.get(key) {
            return LedgerStatus::Provisioned(record.clone());
        }
        match self.claims.get(key) {
            Some(claim) if claim.is_live(now) => LedgerStatus::InFlight(*claim),
            Some(claim) => LedgerStatus::Stale(*claim),
            None => LedgerStatus::Fresh,
        }
    }

    pub fn is_processed(&self, key: &IdempotencyKey) -> bool {
        self.processed.contains_key(key)
    }

    pub fn record_for(&self, key: &IdempotencyKey) -> Option<&ProvisioningRecord> {
        self.processed.get(key)
    }

    pub fn claim_for(&self, key: &IdempotencyKey) -> Option<&ProvisioningClaim> {
        self.claims.get(key)
    }

    /// Places a claim for a fresh `key`.
    ///
    /// Returns false (and changes nothing) for any other status, including
    /// a stale claim.
    pub fn try_claim(
        &mut self,
        key: &IdempotencyKey,
        token: ClaimToken,
        now: Timestamp,
        lease_secs: u64,
    ) -> bool {
        if self.status(key, now) != LedgerStatus::Fresh {
            return false;
        }
        self.claims.insert(
            key.clone(),
            ProvisioningClaim {
                token,
                claimed_at: now,
                lease_expires_at: now.plus_secs(lease_secs),
            },
        );
        true
    }

    /// Removes the claim for `key` if it is still owned by `token`.
    pub fn release(&mut self, key: &IdempotencyKey, token: ClaimToken) -> bool {
        match self.claims.get(key) {
            Some(claim) if claim.token == token => {
                self.claims.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Removes a claim whose lease ran out at `now`.
    ///
    /// Live claims and provisioned or processed keys are left alone.
    pub fn clear_stale(&mut self, key: &IdempotencyKey, now: Timestamp) -> bool {
        match self.status(key, now) {
            LedgerStatus::Stale(_) => {
                self.claims.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Marks the account as created, replacing any claim for the key.
    ///
    /// No-op if the key is already processed.
    pub fn mark_provisioned(&mut self, record: ProvisioningRecord) {
        let key = record.idempotency_key.clone();
        self.claims.remove(&key);
        if !self.processed.contains_key(&key) {
            self.provisioned.insert(key, record);
        }
    }

    /// Records completed provisioning and drops any claim or provisioned
    /// entry for the key.
    pub fn record(&mut self, record: ProvisioningRecord) {
        self.claims.remove(&record.idempotency_key);
        self.provisioned.remove(&record.idempotency_key);
        self.processed
            .insert(record.idempotency_key.clone(), record);
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty() && self.provisioned.is_empty() && self.claims.is_empty()
    }
}
