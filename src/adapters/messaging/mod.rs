//! Outbound messaging adapters.
//!
//! - `LoggingMessenger` - writes messages to the log instead of a channel
//! - `MockMessenger` - records messages for assertions, with failure injection

mod logging_messenger;
mod mock_messenger;

pub use logging_messenger::LoggingMessenger;
pub use mock_messenger::{MockMessenger, SentMessage};
