//! Provider errors

use thiserror::Error;

/// Errors surfaced by a load balancer provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A single backend operation failed. Recoverable: the reconciler logs
    /// it and continues with the remaining steps.
    #[error("provider operation failed: {0}")]
    Api(String),

    /// Required provider configuration is absent. Fatal at startup.
    #[error("missing provider configuration: {0}")]
    MissingConfig(String),
}
