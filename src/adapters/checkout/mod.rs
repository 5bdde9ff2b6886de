//! Checkout adapters.

mod mock_checkout;

pub use mock_checkout::MockCheckoutProvider;
