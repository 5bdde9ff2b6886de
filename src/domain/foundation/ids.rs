//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::ValidationError;

/// Stable external identifier of an end user (e.g. a phone number).
///
/// This is the primary key of a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new UserId, returning error if empty.
    ///
    /// Surrounding whitespace is trimmed.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("user_id"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of an external payment event, used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Creates a new IdempotencyKey, returning error if empty.
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("idempotency_key"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Random token identifying one in-flight provisioning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimToken(Uuid);

impl ClaimToken {
    /// Creates a new random ClaimToken.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClaimToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_accepts_non_empty_value() {
        let id = UserId::new("5551999990000").unwrap();
        assert_eq!(id.as_str(), "5551999990000");
    }

    #[test]
    fn user_id_trims_whitespace() {
        let id = UserId::new("  5551999990000\n").unwrap();
        assert_eq!(id.to_string(), "5551999990000");
    }

    #[test]
    fn user_id_rejects_blank_value() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
    }

    #[test]
    fn user_id_serializes_transparently() {
        let id = UserId::new("5551999990000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"5551999990000\"");
    }

    #[test]
    fn idempotency_key_rejects_blank_value() {
        let result = IdempotencyKey::new(" ");
        assert_eq!(
            result.unwrap_err(),
            ValidationError::empty_field("idempotency_key")
        );
    }

    #[test]
    fn idempotency_keys_compare_by_value() {
        let a = IdempotencyKey::new("evt_123").unwrap();
        let b = IdempotencyKey::new("evt_123").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn claim_tokens_are_unique() {
        assert_ne!(ClaimToken::new(), ClaimToken::new());
    }
}
