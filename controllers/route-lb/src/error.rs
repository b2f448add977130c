//! Controller-specific error types.

use kube::Error as KubeError;
use lb_provider::ProviderError;
use thiserror::Error;

/// Errors that can occur in the route-lb controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Load balancer provider error
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Invalid or missing startup configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Signal handling error
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}
