//! In-memory implementation of SessionRepository.
//!
//! Keeps sessions in a `tokio::sync::RwLock<HashMap>`. The write lock makes
//! the version check and the write of `compare_and_save` one atomic step.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::conversation::{Session, SessionVersion};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{SaveResult, SessionRepository};

/// Process-local session store with idle TTL applied on load.
#[derive(Debug)]
pub struct InMemorySessionRepository {
    ttl_secs: u64,
    sessions: RwLock<HashMap<UserId, Session>>,
}

impl InMemorySessionRepository {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Returns the stored record as-is, without applying the TTL.
    pub async fn stored(&self, user_id: &UserId) -> Option<Session> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn load(&self, user_id: &UserId) -> Result<Session, DomainError> {
        let now = Timestamp::now();
        let stored = self.sessions.read().await.get(user_id).cloned();
        match stored {
            Some(mut session) => {
                if session.expire_if_idle(self.ttl_secs, now) {
                    tracing::debug!(
                        user_id = %user_id,
                        version = %session.version(),
                        "Session idle beyond TTL, reset to initial state"
                    );
                }
                Ok(session)
            }
            None => Ok(Session::new(user_id.clone(), now)),
        }
    }

    async fn compare_and_save(
        &self,
        session: &Session,
        expected: SessionVersion,
    ) -> Result<SaveResult, DomainError> {
        let mut sessions = self.sessions.write().await;
        let current = sessions
            .get(session.user_id())
            .map(Session::version)
            .unwrap_or_else(SessionVersion::unsaved);

        if current != expected {
            tracing::debug!(
                user_id = %session.user_id(),
                expected = %expected,
                current = %current,
                "Session version conflict"
            );
            return Ok(SaveResult::Conflict);
        }

        let next = expected.next();
        sessions.insert(session.user_id().clone(), session.clone().with_version(next));
        Ok(SaveResult::Saved(next))
    }

    async fn purge_idle_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.last_activity().is_before(&cutoff));
        Ok((before - sessions.len()) as u64)
    }
}
