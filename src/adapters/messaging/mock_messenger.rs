//! Mock messenger that records everything it is asked to send.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::foundation::UserId;
use crate::ports::{MessagingError, OutboundMessenger};

/// A recorded outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: UserId,
    pub body: String,
}

#[derive(Default, Clone)]
pub struct MockMessenger {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    sent: Vec<SentMessage>,
    error: Option<MessagingError>,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fails every send until cleared with `None`.
    pub fn set_error(&self, error: Option<MessagingError>) {
        self.state().error = error;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Messages sent to `to`, oldest first.
    pub fn sent_to(&self, to: &UserId) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter(|m| &m.to == to)
            .map(|m| m.body.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state().sent.len()
    }
}

#[async_trait]
impl OutboundMessenger for MockMessenger {
    async fn send_text(&self, to: &UserId, body: &str) -> Result<(), MessagingError> {
        let mut state = self.state();
        if let Some(error) = state.error.clone() {
            return Err(error);
        }
        state.sent.push(SentMessage {
            to: to.clone(),
            body: body.to_string(),
        });
        Ok(())
    }
}
