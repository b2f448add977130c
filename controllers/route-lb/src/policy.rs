//! Annotation policy resolution
//!
//! Turns a route's annotations into the pool policy applied to the external
//! load balancer. Resolution is total: an annotation that fails to parse
//! keeps its default and is reported as a diagnostic, never an error.

use crds::{
    HEALTH_CHECK_METHOD_ANNOTATION, HEALTH_CHECK_PATH_ANNOTATION, LB_METHOD_ANNOTATION,
    MAINTENANCE_ANNOTATION, POOL_PGA_ANNOTATION, Route,
};
use tracing::warn;

/// Desired load balancer configuration for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPolicy {
    /// Health check path probed by the pool monitor.
    pub health_check_path: String,
    /// HTTP method used by the pool monitor.
    pub health_check_method: String,
    /// Pool load balancing method. Empty selects the backend default.
    pub lb_method: String,
    /// Priority group activation: minimum active members.
    pub pga: u32,
    /// Whether this cluster's member is drained.
    pub maintenance: bool,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            health_check_path: "/".to_string(),
            health_check_method: "GET".to_string(),
            lb_method: String::new(),
            pga: 0,
            maintenance: false,
        }
    }
}

/// Resolves the pool policy for a route from its annotations.
pub fn resolve(route: &Route) -> PoolPolicy {
    let mut policy = PoolPolicy::default();
    if let Some(value) = route.annotation(HEALTH_CHECK_PATH_ANNOTATION) {
        policy.health_check_path = value.to_string();
    }
    if let Some(value) = route.annotation(HEALTH_CHECK_METHOD_ANNOTATION) {
        policy.health_check_method = value.to_string();
    }
    if let Some(value) = route.annotation(LB_METHOD_ANNOTATION) {
        policy.lb_method = value.to_string();
    }
    if let Some(value) = route.annotation(POOL_PGA_ANNOTATION) {
        match value.parse::<u32>() {
            Ok(pga) => policy.pga = pga,
            Err(e) => warn!(
                "ignoring unparsable {} value {:?}: {}",
                POOL_PGA_ANNOTATION, value, e
            ),
        }
    }
    policy.maintenance = route.annotation(MAINTENANCE_ANNOTATION).is_some();
    policy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{RouteSpec, RouteTargetReference};
    use std::collections::BTreeMap;

    fn route_with(annotations: &[(&str, &str)]) -> Route {
        let mut route = Route::new(
            "r",
            RouteSpec {
                host: "foo.test.com".to_string(),
                path: None,
                to: RouteTargetReference {
                    kind: None,
                    name: "backend".to_string(),
                    weight: None,
                },
                tls: None,
            },
        );
        route.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
        route
    }

    #[test]
    fn defaults_without_annotations() {
        let policy = resolve(&route_with(&[]));
        assert_eq!(policy, PoolPolicy::default());
        assert_eq!(policy.health_check_path, "/");
        assert_eq!(policy.health_check_method, "GET");
        assert_eq!(policy.lb_method, "");
        assert_eq!(policy.pga, 0);
        assert!(!policy.maintenance);
    }

    #[test]
    fn each_annotation_overrides_one_field() {
        let policy = resolve(&route_with(&[(HEALTH_CHECK_PATH_ANNOTATION, "/healthz")]));
        assert_eq!(policy.health_check_path, "/healthz");
        assert_eq!(policy.health_check_method, "GET");

        let policy = resolve(&route_with(&[(HEALTH_CHECK_METHOD_ANNOTATION, "HEAD")]));
        assert_eq!(policy.health_check_method, "HEAD");
        assert_eq!(policy.health_check_path, "/");

        let policy = resolve(&route_with(&[(LB_METHOD_ANNOTATION, "least-connections-member")]));
        assert_eq!(policy.lb_method, "least-connections-member");

        let policy = resolve(&route_with(&[(POOL_PGA_ANNOTATION, "2")]));
        assert_eq!(policy.pga, 2);
    }

    #[test]
    fn unparsable_pga_keeps_default() {
        let policy = resolve(&route_with(&[(POOL_PGA_ANNOTATION, "two")]));
        assert_eq!(policy.pga, 0);

        let policy = resolve(&route_with(&[(POOL_PGA_ANNOTATION, "-1")]));
        assert_eq!(policy.pga, 0);
    }

    #[test]
    fn maintenance_is_a_presence_test() {
        let policy = resolve(&route_with(&[(MAINTENANCE_ANNOTATION, "")]));
        assert!(policy.maintenance);
    }

    #[test]
    fn resolution_is_stable() {
        let route = route_with(&[
            (HEALTH_CHECK_PATH_ANNOTATION, "/ping"),
            (POOL_PGA_ANNOTATION, "1"),
        ]);
        assert_eq!(resolve(&route), resolve(&route));
    }
}
