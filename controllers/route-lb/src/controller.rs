//! Route event dispatch
//!
//! `RouteController` receives the added/updated/deleted callbacks from the
//! watcher, decides per event whether the route participates in load
//! balancing, and drives the matching reconciliation workflow. It also runs
//! the startup sweep that removes backend state for routes deleted while the
//! controller was not running.

use std::sync::Arc;

use crds::{Route, is_managed_host};
use lb_provider::LbProvider;
use tracing::{debug, info};

use crate::diagnostics::ErrorSink;
use crate::policy;
use crate::reconciler::Reconciler;

/// Dispatches route events to the reconciliation workflows.
pub struct RouteController {
    watched_suffix: String,
    cluster_alias: String,
    provider: Arc<dyn LbProvider>,
    reconciler: Reconciler,
}

impl RouteController {
    /// Creates a controller for the given watched hostname suffix and
    /// cluster member identity.
    pub fn new(
        watched_suffix: String,
        cluster_alias: String,
        provider: Arc<dyn LbProvider>,
        sink: Option<Arc<dyn ErrorSink>>,
    ) -> Self {
        let reconciler = Reconciler::new(provider.clone(), cluster_alias.clone(), sink);
        Self {
            watched_suffix,
            cluster_alias,
            provider,
            reconciler,
        }
    }

    fn is_managed(&self, route: &Route, host: &str) -> bool {
        is_managed_host(route, host, &self.watched_suffix)
    }

    /// A route appeared. Exposes it on the load balancer when managed.
    pub async fn on_added(&self, route: &Route) {
        let host = route.spec_host();
        if !self.is_managed(route, host) {
            debug!("route host {} is not managed, skipping", host);
            return;
        }
        let policy = policy::resolve(route);
        self.reconciler.ensure_present(host, &policy).await;
    }

    /// A route disappeared. Withdraws this cluster from its pools when it
    /// was managed.
    pub async fn on_deleted(&self, route: &Route) {
        let host = route.spec_host();
        if !self.is_managed(route, host) {
            debug!("route host {} is not managed, skipping", host);
            return;
        }
        self.reconciler.ensure_absent(host).await;
    }

    /// A route changed. Both objects must already be admitted; the managed
    /// predicate is evaluated independently on the old and new object and
    /// the transition decides the workflow:
    /// unmanaged -> managed: ensure-present, managed -> unmanaged:
    /// ensure-absent, managed -> managed: patch the policy difference,
    /// unmanaged -> unmanaged (including resync redeliveries): nothing.
    pub async fn on_updated(&self, old: &Route, new: &Route) {
        let (Some(old_host), Some(new_host)) = (old.admitted_host(), new.admitted_host()) else {
            debug!("route not admitted on both sides of the update, skipping");
            return;
        };

        let managed_old = self.is_managed(old, old_host);
        let managed_new = self.is_managed(new, new_host);

        if !managed_old && managed_new {
            let policy = policy::resolve(new);
            self.reconciler.ensure_present(new_host, &policy).await;
        } else if managed_old && !managed_new {
            self.reconciler.ensure_absent(old_host).await;
        } else if managed_new {
            self.reconciler
                .patch(new_host, &policy::resolve(old), &policy::resolve(new))
                .await;
        }
    }

    /// Startup sweep: removes backend pools that carry this cluster's member
    /// but no longer match any managed route. Missing present state is not
    /// repaired here; the initial watch replay does that through the normal
    /// added/updated path.
    pub async fn startup_cleanup(&self, routes: &[Route]) {
        let orphans = self
            .provider
            .check_pools(routes, &self.watched_suffix, &self.cluster_alias)
            .await;
        for host in orphans {
            info!("removing orphaned lb configuration for host {}", host);
            self.reconciler.ensure_absent(&host).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{
        LB_ENABLED_ANNOTATION, POOL_PGA_ANNOTATION, RouteIngress, RouteSpec, RouteStatus,
        RouteTargetReference,
    };
    use lb_provider::mock::MockProvider;
    use std::collections::BTreeMap;

    fn route(spec_host: &str, ingress_host: Option<&str>, annotations: &[(&str, &str)]) -> Route {
        let mut route = Route::new(
            "r",
            RouteSpec {
                host: spec_host.to_string(),
                path: None,
                to: RouteTargetReference {
                    kind: None,
                    name: "other".to_string(),
                    weight: None,
                },
                tls: None,
            },
        );
        if !annotations.is_empty() {
            route.metadata.annotations = Some(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            );
        }
        if let Some(host) = ingress_host {
            route.status = Some(RouteStatus {
                ingress: vec![RouteIngress {
                    host: host.to_string(),
                    router_name: None,
                }],
            });
        }
        route
    }

    fn controller(mock: &Arc<MockProvider>) -> RouteController {
        RouteController::new("test.com".to_string(), "dc1".to_string(), mock.clone(), None)
    }

    #[tokio::test]
    async fn added_managed_by_suffix_creates_lb_config() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_added(&route("foo.test.com", Some(""), &[])).await;

        let calls = mock.calls();
        assert!(!calls.is_empty());
        assert_eq!(calls[0], "PreUpdate");
        assert_eq!(calls[1], "CreatePool foo.test.com_80");

        // only ports 80 and 443 are ever touched
        for call in &calls {
            if let Some((_, name)) = call.rsplit_once(' ') {
                if name.contains('_') {
                    assert!(
                        name.ends_with("_80") || name.ends_with("_443"),
                        "unexpected port in {call}"
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn added_with_opt_in_annotation_creates_lb_config() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_added(&route("leet.com", Some(""), &[(LB_ENABLED_ANNOTATION, "enabled")]))
            .await;
        assert_eq!(mock.calls()[1], "CreatePool leet.com_80");
    }

    #[tokio::test]
    async fn added_unmanaged_makes_no_calls() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_added(&route("foo.testx.com", Some(""), &[])).await;
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn deleted_managed_removes_lb_config() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_deleted(&route("foo.test.com", Some(""), &[])).await;
        assert_eq!(mock.calls()[1], "DeletePoolMember dc1 foo.test.com_80");
    }

    #[tokio::test]
    async fn deleted_unmanaged_makes_no_calls() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_deleted(&route("foo.testx.com", Some(""), &[])).await;
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn updated_without_admitted_hosts_is_skipped() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_updated(
            &route("foo.test.com", None, &[]),
            &route("foo.test.com", None, &[]),
        )
        .await;
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn updated_unchanged_unmanaged_makes_no_calls() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        let r = route("", Some("foo.texst.com"), &[]);
        c.on_updated(&r, &r).await;
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn resync_of_unchanged_managed_route_makes_no_calls() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        let r = route("", Some("foo.test.com"), &[]);
        c.on_updated(&r, &r).await;
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn updated_host_leaving_suffix_removes_lb_config() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_updated(
            &route("", Some("foo.test.com"), &[]),
            &route("", Some("foo.texst.com"), &[]),
        )
        .await;
        assert_eq!(mock.calls()[1], "DeletePoolMember dc1 foo.test.com_80");
    }

    #[tokio::test]
    async fn updated_host_entering_suffix_creates_lb_config() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_updated(
            &route("", Some("foo.tesxt.com"), &[]),
            &route("", Some("foo.test.com"), &[]),
        )
        .await;
        assert_eq!(mock.calls()[1], "CreatePool foo.test.com_80");
    }

    #[tokio::test]
    async fn updated_opt_in_added_creates_lb_config() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_updated(
            &route("", Some("foo.com"), &[]),
            &route("", Some("foo.com"), &[(LB_ENABLED_ANNOTATION, "enabled")]),
        )
        .await;
        assert_eq!(mock.calls()[1], "CreatePool foo.com_80");
    }

    #[tokio::test]
    async fn updated_opt_in_removed_removes_lb_config() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_updated(
            &route("", Some("leet.com"), &[(LB_ENABLED_ANNOTATION, "enabled")]),
            &route("", Some("leet.com"), &[]),
        )
        .await;
        assert_eq!(mock.calls()[1], "DeletePoolMember dc1 leet.com_80");
    }

    #[tokio::test]
    async fn updated_pga_change_patches_pools_only() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_updated(
            &route("", Some("foo.test.com"), &[]),
            &route("", Some("foo.test.com"), &[(POOL_PGA_ANNOTATION, "1")]),
        )
        .await;

        let expected = vec![
            "PreUpdate",
            "ModifyPool foo.test.com_80",
            "ModifyPool foo.test.com_443",
            "PostUpdate",
        ];
        assert_eq!(mock.calls(), expected);
    }

    #[tokio::test]
    async fn updated_health_check_change_patches_monitors_only() {
        let mock = Arc::new(MockProvider::new());
        let c = controller(&mock);
        c.on_updated(
            &route("", Some("foo.test.com"), &[]),
            &route(
                "",
                Some("foo.test.com"),
                &[(crds::HEALTH_CHECK_PATH_ANNOTATION, "/healthz")],
            ),
        )
        .await;

        let expected = vec![
            "PreUpdate",
            "ModifyMonitor foo.test.com_80",
            "ModifyMonitor foo.test.com_443",
            "PostUpdate",
        ];
        assert_eq!(mock.calls(), expected);
    }

    #[tokio::test]
    async fn startup_cleanup_removes_orphaned_pools() {
        let mock = Arc::new(MockProvider::new());
        mock.seed_pool("orphan.test.com", 80, &["dc1"]);
        mock.seed_pool("orphan.test.com", 443, &["dc1"]);
        mock.seed_pool("foo.test.com", 80, &["dc1"]);
        mock.seed_pool("foo.test.com", 443, &["dc1"]);
        let c = controller(&mock);

        let routes = vec![route("foo.test.com", Some(""), &[])];
        c.startup_cleanup(&routes).await;

        let calls = mock.calls();
        assert!(calls.contains(&"DeletePoolMember dc1 orphan.test.com_80".to_string()));
        assert!(calls.contains(&"DeletePoolMember dc1 orphan.test.com_443".to_string()));
        assert!(!calls.iter().any(|c| c.contains("DeletePoolMember dc1 foo.test.com")));
        assert!(!mock.has_pool("orphan.test.com", 80));
        assert!(mock.has_pool("foo.test.com", 80));
    }

    #[tokio::test]
    async fn startup_cleanup_ignores_pools_of_other_clusters() {
        let mock = Arc::new(MockProvider::new());
        mock.seed_pool("other.test.com", 80, &["dc2"]);
        let c = controller(&mock);
        c.startup_cleanup(&[]).await;
        assert!(mock.has_pool("other.test.com", 80));
    }
}
