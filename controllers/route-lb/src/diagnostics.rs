//! Diagnostics sink
//!
//! Optional observer for recoverable workflow failures. The reconciler
//! reports every failed step here in addition to logging it; whether a sink
//! is present has no effect on control flow.

use lb_provider::ProviderError;

/// Receives one report per failed workflow step.
pub trait ErrorSink: Send + Sync {
    /// `operation` is the step name, `host` the affected host key.
    fn report(&self, operation: &str, host: &str, error: &ProviderError);
}
