//! Session repository port.
//!
//! Defines the contract for loading and persisting conversation sessions
//! under optimistic concurrency.
//!
//! # Design
//!
//! - **Never "not found"**: `load` materializes a fresh session for unknown
//!   or expired users instead of failing.
//! - **Compare-and-save**: a write succeeds only if the stored version still
//!   equals the version the caller read. Conflicts are a normal outcome,
//!   not an error.
//! - **Logical expiry**: implementations apply the idle TTL on `load`; the
//!   record is not deleted.

use async_trait::async_trait;

use crate::domain::conversation::{Session, SessionVersion};
use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Outcome of a compare-and-save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// The session was written; carries the new stored version.
    Saved(SessionVersion),
    /// The stored version no longer matched the expected one.
    Conflict,
}

impl SaveResult {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveResult::Saved(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SaveResult::Conflict)
    }
}

/// Repository port for per-user conversation sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Returns the stored session for `user_id`, or a fresh one.
    ///
    /// A stored session idle beyond the TTL comes back reset to the initial
    /// state with an empty scratchpad, keeping its stored version and its
    /// provisioning ledger.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` if the store is unavailable
    async fn load(&self, user_id: &UserId) -> Result<Session, DomainError>;

    /// Writes `session` if the stored version still equals `expected`.
    ///
    /// `expected` of [`SessionVersion::unsaved`] means "no record may exist
    /// yet". On success the stored version is `expected.next()`.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` if the store is unavailable
    async fn compare_and_save(
        &self,
        session: &Session,
        expected: SessionVersion,
    ) -> Result<SaveResult, DomainError>;

    /// Physically removes sessions whose last activity is before `cutoff`.
    ///
    /// Returns the number of removed sessions.
    async fn purge_idle_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}
