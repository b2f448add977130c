//! F5 BIG-IP provider
//!
//! Drives pools, members and monitors over the iControl REST API. Supports
//! an HA pair: `pre_update` repoints the session at the active device when
//! the cached one went standby, `post_update` config-syncs the device group.

use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use bigip_client::{BigIpClient, BigIpError, Monitor, PoolMemberPatch};
use crds::{Route, is_managed_host};
use lb_provider::{LbProvider, ProviderError, ProviderRegistry};
use tokio::sync::RwLock;
use tracing::{info, warn};

const PROVIDER_NAME: &str = "f5";
const DEFAULT_DEVICE_GROUP: &str = "cluster";
const DEFAULT_PARTITION: &str = "Common";

/// Registers the F5 provider in `registry`.
pub fn register(registry: &ProviderRegistry) {
    registry.register(PROVIDER_NAME, Arc::new(F5Provider::new()));
}

struct F5Session {
    client: BigIpClient,
    addresses: Vec<String>,
    current: usize,
    username: String,
    password: String,
    partition: String,
    group_name: String,
    cluster_alias: String,
}

/// F5 BIG-IP implementation of the provider contract.
#[derive(Default)]
pub struct F5Provider {
    session: RwLock<Option<F5Session>>,
}

fn pool_name(host: &str, port: u16) -> String {
    format!("{host}_{port}")
}

fn monitor_scheme(port: u16) -> &'static str {
    if port == 443 { "https" } else { "http" }
}

fn probe_send_string(http_method: &str, uri: &str, host: &str) -> String {
    format!("{http_method} {uri} HTTP/1.1\r\nHost:{host}  \r\nConnection: Close\r\n\r\n")
}

const PROBE_RECV_PATTERN: &str = "^HTTP.1.(0|1) ([2|3]0[0-9])";

fn api_err(err: BigIpError) -> ProviderError {
    ProviderError::Api(err.to_string())
}

/// Maps a create result onto the idempotent-create contract: a conflict
/// means the resource is already there, which is what we wanted.
fn absorb_conflict(result: Result<(), BigIpError>) -> Result<(), ProviderError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_conflict() => Ok(()),
        Err(err) => Err(api_err(err)),
    }
}

impl F5Provider {
    /// Creates an uninitialized provider; `initialize` opens the session.
    pub fn new() -> Self {
        Self::default()
    }

    fn required(name: &str) -> Result<String, ProviderError> {
        env::var(name)
            .map_err(|_| ProviderError::MissingConfig(format!("{name} environment variable needed")))
    }

    async fn client(&self) -> Result<BigIpClient, ProviderError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.client.clone())
            .ok_or_else(|| ProviderError::Api("F5 provider is not initialized".to_string()))
    }

    async fn cluster_alias(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.cluster_alias.clone())
    }

    /// Patches this cluster's member in the pool: session state from the
    /// maintenance flag, role priority group.
    async fn modify_member(
        &self,
        client: &BigIpClient,
        host: &str,
        port: u16,
        maintenance: bool,
        priority: i32,
    ) {
        let Some(alias) = self.cluster_alias().await else {
            return;
        };
        let pool = pool_name(host, port);
        let member_name = format!("{alias}:{port}");
        let members = match client.pool_members(&pool).await {
            Ok(members) => members,
            Err(err) => {
                warn!("error fetching members of pool {}: {}", pool, err);
                return;
            }
        };
        if !members.iter().any(|member| member.name == member_name) {
            return;
        }
        let session = if maintenance {
            info!("setting pool member {} in pool {} to disabled", alias, pool);
            "user-disabled"
        } else {
            info!("setting pool member {} in pool {} to enabled", alias, pool);
            "user-enabled"
        };
        let patch = PoolMemberPatch {
            session: Some(session.to_string()),
            priority_group: Some(priority),
        };
        if let Err(err) = client.patch_pool_member(&pool, &member_name, &patch).await {
            warn!("error patching pool member {}: {}", member_name, err);
        }
    }
}

#[async_trait::async_trait]
impl LbProvider for F5Provider {
    async fn initialize(&self) -> Result<(), ProviderError> {
        let address = Self::required("F5_ADDR")?;
        let username = Self::required("F5_USER")?;
        let password = Self::required("F5_PASSWORD")?;
        let cluster_alias = Self::required("CLUSTER_ALIAS")?;
        let partition =
            env::var("F5_PARTITION").unwrap_or_else(|_| DEFAULT_PARTITION.to_string());
        let group_name =
            env::var("F5_CLUSTERGROUP").unwrap_or_else(|_| DEFAULT_DEVICE_GROUP.to_string());

        let addresses: Vec<String> = address.split(',').map(str::to_string).collect();
        let client = BigIpClient::new(&addresses[0], &username, &password, &partition)
            .map_err(api_err)?;

        info!(
            "F5 session opened against {} (partition {}, {} addresses)",
            addresses[0],
            partition,
            addresses.len()
        );
        *self.session.write().await = Some(F5Session {
            client,
            addresses,
            current: 0,
            username,
            password,
            partition,
            group_name,
            cluster_alias,
        });
        Ok(())
    }

    async fn create_pool(&self, host: &str, port: u16) -> Result<(), ProviderError> {
        let client = self.client().await?;
        absorb_conflict(client.create_pool(&pool_name(host, port)).await)
    }

    async fn add_pool_member(
        &self,
        member: &str,
        host: &str,
        port: u16,
    ) -> Result<(), ProviderError> {
        let client = self.client().await?;
        let member_name = format!("{member}:{port}");
        absorb_conflict(
            client
                .add_pool_member(&pool_name(host, port), &member_name)
                .await,
        )
    }

    async fn modify_pool(
        &self,
        host: &str,
        port: u16,
        lb_method: &str,
        pga: u32,
        maintenance: bool,
        priority: i32,
    ) -> Result<(), ProviderError> {
        let client = self.client().await?;
        let name = pool_name(host, port);
        let mut pool = client.get_pool(&name).await.map_err(api_err)?;

        let target_mode = if lb_method.is_empty() {
            "round-robin"
        } else {
            lb_method
        };
        info!("changing pool {} loadbalancingmode to {}", name, target_mode);
        pool.load_balancing_mode = Some(target_mode.to_string());
        info!("changing pool {} pga to {}", name, pga);
        pool.min_active_members = Some(pga);

        self.modify_member(&client, host, port, maintenance, priority)
            .await;

        client.modify_pool(&name, &pool).await.map_err(api_err)
    }

    async fn create_monitor(
        &self,
        host: &str,
        port: u16,
        uri: &str,
        http_method: &str,
        interval: u32,
        timeout: u32,
    ) -> Result<(), ProviderError> {
        let client = self.client().await?;
        absorb_conflict(
            client
                .create_monitor(
                    &pool_name(host, port),
                    monitor_scheme(port),
                    interval,
                    timeout,
                    &probe_send_string(http_method, uri, host),
                    PROBE_RECV_PATTERN,
                )
                .await,
        )
    }

    async fn modify_monitor(
        &self,
        host: &str,
        port: u16,
        uri: &str,
        http_method: &str,
        interval: u32,
        timeout: u32,
    ) -> Result<(), ProviderError> {
        let client = self.client().await?;
        let monitor = Monitor {
            name: pool_name(host, port),
            partition: client.partition().to_string(),
            interval: Some(interval),
            timeout: Some(timeout),
            send: Some(probe_send_string(http_method, uri, host)),
            recv: None,
        };
        client
            .patch_monitor(&pool_name(host, port), monitor_scheme(port), &monitor)
            .await
            .map_err(api_err)
    }

    async fn add_monitor_to_pool(&self, host: &str, port: u16) -> Result<(), ProviderError> {
        let client = self.client().await?;
        let name = pool_name(host, port);
        absorb_conflict(client.attach_monitor(&name, &name).await)
    }

    async fn delete_pool_member(
        &self,
        member: &str,
        host: &str,
        port: u16,
    ) -> Result<(), ProviderError> {
        let client = self.client().await?;
        let member_name = format!("{member}:{port}");
        client
            .delete_pool_member(&pool_name(host, port), &member_name)
            .await
            .map_err(api_err)
    }

    async fn check_and_clean(&self, host: &str, port: u16) {
        let Ok(client) = self.client().await else {
            return;
        };
        let name = pool_name(host, port);
        let members = match client.pool_members(&name).await {
            Ok(members) => members,
            Err(err) => {
                warn!("error retrieving poolmembers {}: {}", name, err);
                return;
            }
        };
        if !members.is_empty() {
            return;
        }
        // pool first: the monitor cannot be deleted while still attached
        if let Err(err) = client.delete_pool(&name).await {
            warn!("error deleting pool {}: {}", name, err);
        }
        if let Err(err) = client.delete_monitor(&name, monitor_scheme(port)).await {
            warn!("error deleting monitor {}: {}", name, err);
        }
    }

    async fn pre_update(&self) {
        let (client, single) = {
            let session = self.session.read().await;
            let Some(session) = session.as_ref() else {
                return;
            };
            (session.client.clone(), session.addresses.len() <= 1)
        };
        // nothing to resolve without an HA peer
        if single {
            return;
        }
        let device = match client.get_current_device().await {
            Ok(device) => device,
            Err(err) => {
                warn!("error determining active device, keeping session: {}", err);
                return;
            }
        };
        if device.failover_state != "standby" {
            return;
        }
        let mut session = self.session.write().await;
        let Some(session) = session.as_mut() else {
            return;
        };
        let next = (session.current + 1) % session.addresses.len();
        match BigIpClient::new(
            &session.addresses[next],
            &session.username,
            &session.password,
            &session.partition,
        ) {
            Ok(client) => {
                info!("repointing F5 session to {}", session.addresses[next]);
                session.current = next;
                session.client = client;
            }
            Err(err) => warn!("error rebuilding F5 session, keeping current: {}", err),
        }
    }

    async fn post_update(&self) {
        let (client, group, single) = {
            let session = self.session.read().await;
            let Some(session) = session.as_ref() else {
                return;
            };
            (
                session.client.clone(),
                session.group_name.clone(),
                session.addresses.len() <= 1,
            )
        };
        if single {
            return;
        }
        if let Err(err) = client.config_sync_to_group(&group).await {
            warn!("error syncing configuration to group {}: {}", group, err);
        }
    }

    async fn check_pools(
        &self,
        routes: &[Route],
        watched_suffix: &str,
        member: &str,
    ) -> HashSet<String> {
        let mut orphans = HashSet::new();
        let Ok(client) = self.client().await else {
            return orphans;
        };
        let pools = match client.pools().await {
            Ok(pools) => pools,
            Err(err) => {
                warn!("error fetching pools: {}", err);
                return orphans;
            }
        };
        for pool in pools {
            let members = match client.pool_members(&pool.name).await {
                Ok(members) => members,
                Err(err) => {
                    warn!("error fetching members of pool {}: {}", pool.name, err);
                    continue;
                }
            };
            let ours = members
                .iter()
                .any(|m| m.name.split(':').next() == Some(member));
            if !ours {
                continue;
            }
            let Some((host, _port)) = pool.name.rsplit_once('_') else {
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

    #[test]
    fn pool_names_embed_the_port() {
        assert_eq!(pool_name("foo.test.com", 80), "foo.test.com_80");
        assert_eq!(pool_name("foo.test.com", 443), "foo.test.com_443");
    }

    #[test]
    fn monitor_scheme_follows_the_port() {
        assert_eq!(monitor_scheme(80), "http");
        assert_eq!(monitor_scheme(443), "https");
    }

    #[test]
    fn probe_request_carries_method_uri_and_host() {
        let send = probe_send_string("GET", "/healthz", "foo.test.com");
        assert!(send.starts_with("GET /healthz HTTP/1.1\r\n"));
        assert!(send.contains("Host:foo.test.com"));
        assert!(send.ends_with("\r\n\r\n"));
    }

    #[test]
    fn conflicts_are_absorbed() {
        let conflict = BigIpError::Api {
            status: 409,
            message: "already exists in partition Common.".to_string(),
        };
        assert!(absorb_conflict(Err(conflict)).is_ok());

        let other = BigIpError::Api {
            status: 500,
            message: "internal".to_string(),
        };
        assert!(absorb_conflict(Err(other)).is_err());
    }
}
