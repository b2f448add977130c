//! Reconciliation workflows
//!
//! The three idempotent workflows converging external load balancer state
//! toward the desired state of a host: ensure-present, ensure-absent and
//! patch. Workflows are best-effort, not transactional: every step runs even
//! when an earlier one failed, and a partially applied state is converged by
//! the next update event or the startup sweep.

use std::sync::Arc;

use futures::future::BoxFuture;
use lb_provider::{LbProvider, ProviderError};
use tracing::{debug, error, info};

use crate::diagnostics::ErrorSink;
use crate::policy::PoolPolicy;

/// Ports reconciled for every host.
pub const PORTS: [u16; 2] = [80, 443];

/// Monitor probe interval in seconds.
const MONITOR_INTERVAL: u32 = 3;

/// Monitor probe timeout in seconds.
const MONITOR_TIMEOUT: u32 = 10;

/// An ordered workflow step: operation name plus the deferred provider call.
type Step<'a> = (&'static str, BoxFuture<'a, Result<(), ProviderError>>);

/// Runs the convergence workflows against one provider.
pub struct Reconciler {
    provider: Arc<dyn LbProvider>,
    cluster_alias: String,
    sink: Option<Arc<dyn ErrorSink>>,
}

impl Reconciler {
    /// Creates a reconciler for this cluster's member identity.
    pub fn new(
        provider: Arc<dyn LbProvider>,
        cluster_alias: String,
        sink: Option<Arc<dyn ErrorSink>>,
    ) -> Self {
        Self {
            provider,
            cluster_alias,
            sink,
        }
    }

    /// Converges the backend toward "host is exposed with this policy":
    /// per port, pool, this cluster's member, pool settings, monitor and
    /// monitor attachment.
    pub async fn ensure_present(&self, host: &str, policy: &PoolPolicy) {
        let provider = self.provider.as_ref();
        let member = self.cluster_alias.as_str();

        self.provider.pre_update().await;
        let mut steps: Vec<Step<'_>> = Vec::new();
        for port in PORTS {
            steps.push((
                "CreatePool",
                Box::pin(async move { provider.create_pool(host, port).await }),
            ));
            steps.push((
                "AddPoolMember",
                Box::pin(async move { provider.add_pool_member(member, host, port).await }),
            ));
            steps.push((
                "ModifyPool",
                Box::pin(async move {
                    provider
                        .modify_pool(host, port, &policy.lb_method, policy.pga, policy.maintenance, 0)
                        .await
                }),
            ));
            steps.push((
                "CreateMonitor",
                Box::pin(async move {
                    provider
                        .create_monitor(
                            host,
                            port,
                            &policy.health_check_path,
                            &policy.health_check_method,
                            MONITOR_INTERVAL,
                            MONITOR_TIMEOUT,
                        )
                        .await
                }),
            ));
            steps.push((
                "AddMonitorToPool",
                Box::pin(async move { provider.add_monitor_to_pool(host, port).await }),
            ));
        }
        self.run_steps(host, steps).await;
        self.provider.post_update().await;
        info!(
            "applied external lb configuration for host {} (member {})",
            host, self.cluster_alias
        );
    }

    /// Converges the backend toward "host is not exposed from this cluster":
    /// per port, remove this cluster's member, then delete monitor and pool
    /// once no members remain.
    pub async fn ensure_absent(&self, host: &str) {
        let provider = self.provider.as_ref();
        let member = self.cluster_alias.as_str();

        self.provider.pre_update().await;
        let mut steps: Vec<Step<'_>> = Vec::new();
        for port in PORTS {
            steps.push((
                "DeletePoolMember",
                Box::pin(async move { provider.delete_pool_member(member, host, port).await }),
            ));
            steps.push((
                "CheckAndClean",
                Box::pin(async move {
                    provider.check_and_clean(host, port).await;
                    Ok(())
                }),
            ));
        }
        self.run_steps(host, steps).await;
        self.provider.post_update().await;
        info!(
            "removed external lb configuration for host {} (member {})",
            host, self.cluster_alias
        );
    }

    /// Applies the difference between two resolved policies. Makes no
    /// provider call at all, brackets included, when the policies are equal,
    /// so resync deliveries of unchanged routes stay silent.
    pub async fn patch(&self, host: &str, old: &PoolPolicy, new: &PoolPolicy) {
        let pool_changed = old.lb_method != new.lb_method
            || old.pga != new.pga
            || old.maintenance != new.maintenance;
        let monitor_changed = old.health_check_path != new.health_check_path
            || old.health_check_method != new.health_check_method;
        if !pool_changed && !monitor_changed {
            debug!("no policy change for host {}", host);
            return;
        }

        let provider = self.provider.as_ref();

        self.provider.pre_update().await;
        let mut steps: Vec<Step<'_>> = Vec::new();
        if pool_changed {
            for port in PORTS {
                steps.push((
                    "ModifyPool",
                    Box::pin(async move {
                        provider
                            .modify_pool(host, port, &new.lb_method, new.pga, new.maintenance, 0)
                            .await
                    }),
                ));
            }
        }
        if monitor_changed {
            for port in PORTS {
                steps.push((
                    "ModifyMonitor",
                    Box::pin(async move {
                        provider
                            .modify_monitor(
                                host,
                                port,
                                &new.health_check_path,
                                &new.health_check_method,
                                MONITOR_INTERVAL,
                                MONITOR_TIMEOUT,
                            )
                            .await
                    }),
                ));
            }
        }
        self.run_steps(host, steps).await;
        self.provider.post_update().await;
        info!("patched external lb configuration for host {}", host);
    }

    /// Runs the steps in order. A failed step is logged and handed to the
    /// sink; the remaining steps still run.
    async fn run_steps(&self, host: &str, steps: Vec<Step<'_>>) {
        for (name, step) in steps {
            if let Err(err) = step.await {
                error!("Error in {} {}: {}", name, host, err);
                if let Some(sink) = &self.sink {
                    sink.report(name, host, &err);
                }
            }
        }
    }
}
