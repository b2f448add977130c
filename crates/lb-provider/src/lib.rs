//! Load balancer provider contract
//!
//! Abstract, pluggable interface for external load balancers plus the
//! registry the controller uses to pick the configured backend at startup.

pub mod error;
pub mod provider;
pub mod registry;

#[cfg(feature = "test-util")]
pub mod mock;

pub use error::ProviderError;
pub use provider::LbProvider;
pub use registry::ProviderRegistry;
