//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSessionRepository` - Session documents with version-checked writes

mod session_repository;

pub use session_repository::{run_migrations, PostgresSessionRepository};
