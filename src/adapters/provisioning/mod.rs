//! Account provisioning adapters.

mod mock_provisioner;

pub use mock_provisioner::{MockProvisioner, ProvisionCall};
