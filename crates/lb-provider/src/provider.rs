//! Provider trait
//!
//! The capability set every load balancer backend implements. All methods
//! take `&self`; a driver keeps whatever session state it needs behind its
//! own lock, since reconciliation only ever runs from a single task.

use std::collections::HashSet;

use crate::error::ProviderError;
use crds::Route;

/// Abstract, pluggable interface for different load balancers.
///
/// Create operations are idempotent: a driver must absorb its backend's
/// "already exists" responses and report success.
#[async_trait::async_trait]
pub trait LbProvider: Send + Sync {
    /// Acquires credentials and opens the backend session. Fails when
    /// required configuration is absent.
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Creates a load balancer pool for `host` on `port`.
    async fn create_pool(&self, host: &str, port: u16) -> Result<(), ProviderError>;

    /// Adds `member` (a cluster alias) to the pool for `host` on `port`.
    async fn add_pool_member(&self, member: &str, host: &str, port: u16)
    -> Result<(), ProviderError>;

    /// Applies pool-level settings: load balancing method (empty selects the
    /// backend default), priority group activation, maintenance drain of this
    /// cluster's member, and the member's role priority.
    async fn modify_pool(
        &self,
        host: &str,
        port: u16,
        lb_method: &str,
        pga: u32,
        maintenance: bool,
        priority: i32,
    ) -> Result<(), ProviderError>;

    /// Creates the health monitor for `host` on `port`.
    async fn create_monitor(
        &self,
        host: &str,
        port: u16,
        uri: &str,
        http_method: &str,
        interval: u32,
        timeout: u32,
    ) -> Result<(), ProviderError>;

    /// Updates the health monitor for `host` on `port`.
    async fn modify_monitor(
        &self,
        host: &str,
        port: u16,
        uri: &str,
        http_method: &str,
        interval: u32,
        timeout: u32,
    ) -> Result<(), ProviderError>;

    /// Attaches the monitor to its pool.
    async fn add_monitor_to_pool(&self, host: &str, port: u16) -> Result<(), ProviderError>;

    /// Removes `member` from the pool for `host` on `port`.
    async fn delete_pool_member(&self, member: &str, host: &str, port: u16)
    -> Result<(), ProviderError>;

    /// Deletes the monitor and pool when the pool has no members left.
    /// A no-op otherwise; failures are absorbed by the driver.
    async fn check_and_clean(&self, host: &str, port: u16);

    /// Runs before every workflow. An HA driver repoints its session at the
    /// active backend node here; failure to determine the active node keeps
    /// the current session.
    async fn pre_update(&self);

    /// Runs after every workflow. An HA driver propagates configuration
    /// across its device group here.
    async fn post_update(&self);

    /// Returns hosts whose backend pools carry a member for `member` but are
    /// no longer matched by any currently managed route.
    async fn check_pools(
        &self,
        routes: &[Route],
        watched_suffix: &str,
        member: &str,
    ) -> HashSet<String>;
}
