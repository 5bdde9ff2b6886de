//! Messenger that logs outbound text.
//!
//! Used when no chat channel is configured, so replies remain visible in
//! the service logs.

use async_trait::async_trait;

use crate::domain::foundation::UserId;
use crate::ports::{MessagingError, OutboundMessenger};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMessenger;

impl LoggingMessenger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutboundMessenger for LoggingMessenger {
    async fn send_text(&self, to: &UserId, body: &str) -> Result<(), MessagingError> {
        tracing::info!(to = %to, chars = body.chars().count(), body = %body, "Outbound message");
        Ok(())
    }
}
