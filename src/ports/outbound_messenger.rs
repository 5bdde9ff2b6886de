//! Outbound messenger port - sends text back to a user.
//!
//! Replies and post-payment notifications go through this port. Delivery
//! failures never roll back session state.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};

/// Errors raised while delivering a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    #[error("Messaging channel unavailable: {0}")]
    Unavailable(String),

    #[error("Recipient {0} rejected by channel")]
    InvalidRecipient(UserId),
}

impl MessagingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, MessagingError::Unavailable(_))
    }
}

impl From<MessagingError> for DomainError {
    fn from(err: MessagingError) -> Self {
        DomainError::new(ErrorCode::MessagingFailed, err.to_string())
    }
}

/// Port for sending text messages to users.
#[async_trait]
pub trait OutboundMessenger: Send + Sync {
    async fn send_text(&self, to: &UserId, body: &str) -> Result<(), MessagingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_messenger_is_object_safe() {
        fn _accepts_dyn(_m: &dyn OutboundMessenger) {}
    }

    #[test]
    fn unavailable_is_retryable() {
        assert!(MessagingError::Unavailable("503".into()).is_retryable());
        let user = UserId::new("5551").unwrap();
        assert!(!MessagingError::InvalidRecipient(user).is_retryable());
    }
}
