//! Route resource
//!
//! Subset of the OpenShift `route.openshift.io/v1` Route API that route-lb
//! consumes. Routes are owned by the platform router; this controller only
//! reads them and mirrors their hostnames into load balancer pools.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Health check path for the pool monitor. Defaults to `/`.
pub const HEALTH_CHECK_PATH_ANNOTATION: &str = "routelb.microscaler.io/path";

/// HTTP method used by the pool monitor. Defaults to `GET`.
pub const HEALTH_CHECK_METHOD_ANNOTATION: &str = "routelb.microscaler.io/method";

/// Pool load balancing method. Empty means the backend default.
pub const LB_METHOD_ANNOTATION: &str = "routelb.microscaler.io/lbmethod";

/// Priority group activation: minimum active members before the pool is
/// considered degraded by the backend. Integer >= 0.
pub const POOL_PGA_ANNOTATION: &str = "routelb.microscaler.io/poolpga";

/// Opt-in annotation. Presence enables load balancing for a route whose
/// hostname is outside the watched suffix.
pub const LB_ENABLED_ANNOTATION: &str = "routelb.microscaler.io/lbenabled";

/// Presence drains this cluster's member out of the pool.
pub const MAINTENANCE_ANNOTATION: &str = "routelb.microscaler.io/maintenance";

/// Route specification.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    namespaced,
    status = "RouteStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Requested hostname for the route.
    #[serde(default)]
    pub host: String,

    /// Path-based routing prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Target service for the route.
    pub to: RouteTargetReference,

    /// TLS termination configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

/// Reference to the service a route points at.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    /// Kind of the target, always `Service` in practice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Name of the target service.
    pub name: String,

    /// Relative weight when multiple targets exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

/// TLS settings of a route.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// Termination type: `edge`, `passthrough` or `reencrypt`.
    #[serde(default)]
    pub termination: String,
}

/// Route status as written by the admitting router.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    /// One entry per router that admitted the route.
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

/// Admission record of a single router.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    /// Hostname the router exposes for this route.
    #[serde(default)]
    pub host: String,

    /// Name of the admitting router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_name: Option<String>,
}

impl Route {
    /// Hostname from the route spec.
    pub fn spec_host(&self) -> &str {
        &self.spec.host
    }

    /// Hostname admitted by the first router, if the route has been admitted.
    pub fn admitted_host(&self) -> Option<&str> {
        self.status
            .as_ref()?
            .ingress
            .first()
            .map(|ingress| ingress.host.as_str())
    }

    /// Value of an annotation on this route.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()?
            .get(key)
            .map(String::as_str)
    }

    /// Whether the route carries the explicit load balancing opt-in.
    /// Presence is the test; the value is not inspected.
    pub fn lb_enabled(&self) -> bool {
        self.annotation(LB_ENABLED_ANNOTATION).is_some()
    }
}

/// Managed predicate: a route participates in load balancer reconciliation
/// for `host` iff the host is under the watched suffix or the route carries
/// the opt-in annotation. Evaluated per host because update events compare
/// the pre-event and post-event objects independently.
pub fn is_managed_host(route: &Route, host: &str, watched_suffix: &str) -> bool {
    host.ends_with(watched_suffix) || route.lb_enabled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn route(host: &str, annotations: &[(&str, &str)]) -> Route {
        let mut r = Route::new(
            "test-route",
            RouteSpec {
                host: host.to_string(),
                path: None,
                to: RouteTargetReference {
                    kind: Some("Service".to_string()),
                    name: "backend".to_string(),
                    weight: None,
                },
                tls: None,
            },
        );
        if !annotations.is_empty() {
            r.metadata.annotations = Some(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            );
        }
        r
    }

    #[test]
    fn spec_host_is_exposed() {
        let r = route("foo.test.com", &[]);
        assert_eq!(r.spec_host(), "foo.test.com");
    }

    #[test]
    fn admitted_host_requires_ingress() {
        let mut r = route("foo.test.com", &[]);
        assert_eq!(r.admitted_host(), None);

        r.status = Some(RouteStatus { ingress: vec![] });
        assert_eq!(r.admitted_host(), None);

        r.status = Some(RouteStatus {
            ingress: vec![RouteIngress {
                host: "foo.test.com".to_string(),
                router_name: Some("default".to_string()),
            }],
        });
        assert_eq!(r.admitted_host(), Some("foo.test.com"));
    }

    #[test]
    fn suffix_match_is_managed() {
        let r = route("foo.test.com", &[]);
        assert!(is_managed_host(&r, "foo.test.com", "test.com"));
        assert!(!is_managed_host(&r, "foo.test.com", "other.com"));
    }

    #[test]
    fn opt_in_annotation_is_managed_regardless_of_suffix() {
        let r = route("leet.com", &[(LB_ENABLED_ANNOTATION, "enabled")]);
        assert!(is_managed_host(&r, "leet.com", "test.com"));

        // presence test: any value counts
        let r = route("leet.com", &[(LB_ENABLED_ANNOTATION, "")]);
        assert!(is_managed_host(&r, "leet.com", "test.com"));
    }

    #[test]
    fn annotation_lookup() {
        let r = route("foo.test.com", &[(HEALTH_CHECK_PATH_ANNOTATION, "/healthz")]);
        assert_eq!(r.annotation(HEALTH_CHECK_PATH_ANNOTATION), Some("/healthz"));
        assert_eq!(r.annotation(HEALTH_CHECK_METHOD_ANNOTATION), None);
    }
}
