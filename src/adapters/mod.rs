//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `memory` - Process-local session store
//! - `postgres` - Durable session store
//! - `provisioning` - Account provisioner implementations
//! - `messaging` - Outbound messenger implementations
//! - `checkout` - Payment link providers
//! - `maintenance` - Background session reaper

pub mod checkout;
pub mod maintenance;
pub mod memory;
pub mod messaging;
pub mod postgres;
pub mod provisioning;

pub use checkout::MockCheckoutProvider;
pub use maintenance::{SessionReaper, SessionReaperConfig};
pub use memory::InMemorySessionRepository;
pub use messaging::{LoggingMessenger, MockMessenger};
pub use postgres::PostgresSessionRepository;
pub use provisioning::MockProvisioner;
