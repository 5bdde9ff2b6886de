//! In-memory adapters for single-process deployments and tests.

mod session_repository;

pub use session_repository::InMemorySessionRepository;
