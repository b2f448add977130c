//! Mock provider for unit testing
//!
//! Records every call and keeps a small in-memory model of pools, members
//! and monitors so idempotent creates, `check_and_clean` and `check_pools`
//! behave like a real backend. Individual operations can be failed on
//! demand for partial-failure tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::ProviderError;
use crate::provider::LbProvider;
use crds::{Route, is_managed_host};

/// One pool in the mock backend.
#[derive(Debug, Default, Clone)]
pub struct MockPool {
    /// Member aliases currently in the pool.
    pub members: HashSet<String>,
    /// Whether the pool's monitor is attached.
    pub monitor_attached: bool,
    /// Configured load balancing method.
    pub lb_method: String,
    /// Configured minimum active members.
    pub pga: u32,
}

#[derive(Debug, Default)]
struct MockState {
    pools: HashMap<String, MockPool>,
    monitors: HashSet<String>,
    calls: Vec<String>,
    fail_ops: HashSet<String>,
}

/// In-memory recording provider for tests.
#[derive(Debug, Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

fn pool_name(host: &str, port: u16) -> String {
    format!("{host}_{port}")
}

impl MockProvider {
    /// Creates an empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls, operation name plus resource, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded operation names only, in order.
    pub fn ops(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| {
                call.split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    /// Clears the recorded calls, keeping backend state.
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Makes every subsequent `op` call fail until cleared.
    pub fn fail_on(&self, op: &str) {
        self.state.lock().unwrap().fail_ops.insert(op.to_string());
    }

    /// Clears all failure injections.
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().fail_ops.clear();
    }

    /// Seeds a pool with members and an attached monitor (test setup).
    pub fn seed_pool(&self, host: &str, port: u16, members: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let name = pool_name(host, port);
        state.pools.insert(
            name.clone(),
            MockPool {
                members: members.iter().map(|m| m.to_string()).collect(),
                monitor_attached: true,
                ..MockPool::default()
            },
        );
        state.monitors.insert(name);
    }

    /// Whether a pool exists for `host` on `port`.
    pub fn has_pool(&self, host: &str, port: u16) -> bool {
        self.state
            .lock()
            .unwrap()
            .pools
            .contains_key(&pool_name(host, port))
    }

    /// Snapshot of a pool, if it exists.
    pub fn pool(&self, host: &str, port: u16) -> Option<MockPool> {
        self.state
            .lock()
            .unwrap()
            .pools
            .get(&pool_name(host, port))
            .cloned()
    }

    /// Whether a monitor exists for `host` on `port`.
    pub fn has_monitor(&self, host: &str, port: u16) -> bool {
        self.state
            .lock()
            .unwrap()
            .monitors
            .contains(&pool_name(host, port))
    }

    fn record(&self, call: String, op: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.fail_ops.contains(op) {
            return Err(ProviderError::Api(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LbProvider for MockProvider {
    async fn initialize(&self) -> Result<(), ProviderError> {
        self.record("Initialize".to_string(), "Initialize")
    }

    async fn create_pool(&self, host: &str, port: u16) -> Result<(), ProviderError> {
        let name = pool_name(host, port);
        self.record(format!("CreatePool {name}"), "CreatePool")?;
        // creating an existing pool is success
        self.state
            .lock()
            .unwrap()
            .pools
            .entry(name)
            .or_insert_with(MockPool::default);
        Ok(())
    }

    async fn add_pool_member(
        &self,
        member: &str,
        host: &str,
        port: u16,
    ) -> Result<(), ProviderError> {
        let name = pool_name(host, port);
        self.record(format!("AddPoolMember {member} {name}"), "AddPoolMember")?;
        if let Some(pool) = self.state.lock().unwrap().pools.get_mut(&name) {
            pool.members.insert(member.to_string());
        }
        Ok(())
    }

    async fn modify_pool(
        &self,
        host: &str,
        port: u16,
        lb_method: &str,
        pga: u32,
        _maintenance: bool,
        _priority: i32,
    ) -> Result<(), ProviderError> {
        let name = pool_name(host, port);
        self.record(format!("ModifyPool {name}"), "ModifyPool")?;
        if let Some(pool) = self.state.lock().unwrap().pools.get_mut(&name) {
            pool.lb_method = lb_method.to_string();
            pool.pga = pga;
        }
        Ok(())
    }

    async fn create_monitor(
        &self,
        host: &str,
        port: u16,
        _uri: &str,
        _http_method: &str,
        _interval: u32,
        _timeout: u32,
    ) -> Result<(), ProviderError> {
        let name = pool_name(host, port);
        self.record(format!("CreateMonitor {name}"), "CreateMonitor")?;
        self.state.lock().unwrap().monitors.insert(name);
        Ok(())
    }

    async fn modify_monitor(
        &self,
        host: &str,
        port: u16,
        _uri: &str,
        _http_method: &str,
        _interval: u32,
        _timeout: u32,
    ) -> Result<(), ProviderError> {
        let name = pool_name(host, port);
        self.record(format!("ModifyMonitor {name}"), "ModifyMonitor")
    }

    async fn add_monitor_to_pool(&self, host: &str, port: u16) -> Result<(), ProviderError> {
        let name = pool_name(host, port);
        self.record(format!("AddMonitorToPool {name}"), "AddMonitorToPool")?;
        if let Some(pool) = self.state.lock().unwrap().pools.get_mut(&name) {
            pool.monitor_attached = true;
        }
        Ok(())
    }

    async fn delete_pool_member(
        &self,
        member: &str,
        host: &str,
        port: u16,
    ) -> Result<(), ProviderError> {
        let name = pool_name(host, port);
        self.record(
            format!("DeletePoolMember {member} {name}"),
            "DeletePoolMember",
        )?;
        if let Some(pool) = self.state.lock().unwrap().pools.get_mut(&name) {
            pool.members.remove(member);
        }
        Ok(())
    }

    async fn check_and_clean(&self, host: &str, port: u16) {
        let name = pool_name(host, port);
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("CheckAndClean {name}"));
        let empty = state
            .pools
            .get(&name)
            .is_some_and(|pool| pool.members.is_empty());
        if empty {
            state.pools.remove(&name);
            state.monitors.remove(&name);
        }
    }

    async fn pre_update(&self) {
        self.state.lock().unwrap().calls.push("PreUpdate".to_string());
    }

    async fn post_update(&self) {
        self.state.lock().unwrap().calls.push("PostUpdate".to_string());
    }

    async fn check_pools(
        &self,
        routes: &[Route],
        watched_suffix: &str,
        member: &str,
    ) -> HashSet<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("CheckPools".to_string());
        let mut orphans = HashSet::new();
        for (name, pool) in &state.pools {
            if !pool.members.contains(member) {
                continue;
            }
            let Some((host, _port)) = name.rsplit_once('_') else {
                continue;
            };
            let still_routed = routes.iter().any(|route| {
                is_managed_host(route, route.spec_host(), watched_suffix)
                    && route.spec_host() == host
            });
            if !still_routed {
                orphans.insert(host.to_string());
            }
        }
        orphans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_pool_is_idempotent() {
        let mock = MockProvider::new();
        mock.create_pool("foo.test.com", 80).await.unwrap();
        mock.create_pool("foo.test.com", 80).await.unwrap();
        assert!(mock.has_pool("foo.test.com", 80));
    }

    #[tokio::test]
    async fn check_and_clean_removes_empty_pool() {
        let mock = MockProvider::new();
        mock.seed_pool("foo.test.com", 80, &["dc1"]);
        mock.delete_pool_member("dc1", "foo.test.com", 80)
            .await
            .unwrap();
        mock.check_and_clean("foo.test.com", 80).await;
        assert!(!mock.has_pool("foo.test.com", 80));
        assert!(!mock.has_monitor("foo.test.com", 80));
    }

    #[tokio::test]
    async fn check_and_clean_keeps_populated_pool() {
        let mock = MockProvider::new();
        mock.seed_pool("foo.test.com", 80, &["dc1", "dc2"]);
        mock.delete_pool_member("dc1", "foo.test.com", 80)
            .await
            .unwrap();
        mock.check_and_clean("foo.test.com", 80).await;
        assert!(mock.has_pool("foo.test.com", 80));
    }

    #[tokio::test]
    async fn injected_failure_is_reported_and_recorded() {
        let mock = MockProvider::new();
        mock.fail_on("CreatePool");
        let err = mock.create_pool("foo.test.com", 80).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api(_)));
        assert_eq!(mock.ops(), vec!["CreatePool"]);
    }
}
