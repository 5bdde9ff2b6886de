//! PostgreSQL implementation of SessionRepository.
//!
//! Each session is one row: the serialized session document plus the
//! columns needed to compare versions and purge idle rows without
//! decoding JSON.
//!
//! Compare-and-save maps to:
//! - `INSERT ... ON CONFLICT DO NOTHING` when no record may exist yet
//! - `UPDATE ... WHERE version = $expected` otherwise
//!
//! Zero affected rows means another writer got there first.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::conversation::{Session, SessionVersion};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{SaveResult, SessionRepository};

/// Applies the bundled schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to run migrations: {}", e)))
}

/// PostgreSQL implementation of the SessionRepository port.
#[derive(Clone)]
pub struct PostgresSessionRepository {
    pool: PgPool,
    ttl_secs: u64,
}

impl std::fmt::Debug for PostgresSessionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSessionRepository")
            .field("pool", &"PgPool")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl PostgresSessionRepository {
    pub fn new(pool: PgPool, ttl_secs: u64) -> Self {
        Self { pool, ttl_secs }
    }

    fn row_to_session(&self, row: SessionRow) -> Result<Session, DomainError> {
        let session: Session = serde_json::from_value(row.document).map_err(|e| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("Corrupt session document: {}", e),
            )
        })?;
        Ok(session.with_version(SessionVersion::from_raw(row.version as u64)))
    }
}

/// Internal row type for sqlx query mapping.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    document: serde_json::Value,
    version: i64,
}

fn to_document(session: &Session, version: SessionVersion) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(session.clone().with_version(version)).map_err(|e| {
        DomainError::new(
            ErrorCode::InternalError,
            format!("Failed to serialize session: {}", e),
        )
    })
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn load(&self, user_id: &UserId) -> Result<Session, DomainError> {
        let now = Timestamp::now();
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT document, version FROM conversation_sessions WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to load session: {}", e)))?;

        let Some(row) = row else {
            return Ok(Session::new(user_id.clone(), now));
        };

        let mut session = self.row_to_session(row)?;
        if session.expire_if_idle(self.ttl_secs, now) {
            tracing::debug!(
                user_id = %user_id,
                version = %session.version(),
                "Session idle beyond TTL, reset to initial state"
            );
        }
        Ok(session)
    }

    async fn compare_and_save(
        &self,
        session: &Session,
        expected: SessionVersion,
    ) -> Result<SaveResult, DomainError> {
        let next = expected.next();
        let document = to_document(session, next)?;

        let result = if expected.is_unsaved() {
            sqlx::query(
                r#"
                INSERT INTO conversation_sessions (user_id, state, document, version, last_activity)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(session.user_id().as_str())
            .bind(session.state().as_str())
            .bind(&document)
            .bind(next.as_u64() as i64)
            .bind(*session.last_activity().as_datetime())
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE conversation_sessions SET
                    state = $2,
                    document = $3,
                    version = $4,
                    last_activity = $5
                WHERE user_id = $1 AND version = $6
                "#,
            )
            .bind(session.user_id().as_str())
            .bind(session.state().as_str())
            .bind(&document)
            .bind(next.as_u64() as i64)
            .bind(*session.last_activity().as_datetime())
            .bind(expected.as_u64() as i64)
            .execute(&self.pool)
            .await
        }
        .map_err(|e| DomainError::database(format!("Failed to save session: {}", e)))?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                user_id = %session.user_id(),
                expected = %expected,
                "Session version conflict"
            );
            return Ok(SaveResult::Conflict);
        }
        Ok(SaveResult::Saved(next))
    }

    async fn purge_idle_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM conversation_sessions WHERE last_activity < $1")
            .bind(*cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to purge sessions: {}", e)))?;
        Ok(result.rows_affected())
    }
}
