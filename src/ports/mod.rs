//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `SessionRepository` - Session persistence with compare-and-save
//! - `AccountProvisioner` - Hosting account creation
//! - `OutboundMessenger` - Text delivery back to users
//! - `CheckoutProvider` - Payment link creation

mod account_provisioner;
mod checkout_provider;
mod outbound_messenger;
mod session_repository;

pub use account_provisioner::{AccountProvisioner, ProvisionedAccount, ProvisioningError};
pub use checkout_provider::{CheckoutError, CheckoutLink, CheckoutProvider};
pub use outbound_messenger::{MessagingError, OutboundMessenger};
pub use session_repository::{SaveResult, SessionRepository};
