//! BIG-IP iControl REST API client

use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::error::BigIpError;
use crate::models::{ApiErrorBody, Device, Items, Monitor, Pool, PoolMember, PoolMemberPatch};

/// iControl REST client bound to one management address and partition.
#[derive(Debug, Clone)]
pub struct BigIpClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    partition: String,
}

impl BigIpClient {
    /// Create a new client for the management address `address`.
    ///
    /// BIG-IP management endpoints ship self-signed certificates, so
    /// certificate verification is disabled for this session.
    pub fn new(
        address: &str,
        username: &str,
        password: &str,
        partition: &str,
    ) -> Result<Self, BigIpError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("https://{}/mgmt/tm", address.trim_end_matches('/')),
            username: username.to_string(),
            password: password.to_string(),
            partition: partition.to_string(),
        })
    }

    /// The partition this session operates in.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// iControl URL path segment for a named object in our partition.
    fn full_path(&self, name: &str) -> String {
        format!("~{}~{}", self.partition, name)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, BigIpError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let code = status.as_u16();
        let message = match response.json::<ApiErrorBody>().await {
            Ok(err) => err.message,
            Err(_) => status.to_string(),
        };
        Err(BigIpError::Api {
            status: code,
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BigIpError> {
        let response = self.execute(Method::GET, path, None).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_json<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<(), BigIpError> {
        let value = serde_json::to_value(body)?;
        self.execute(method, path, Some(value)).await?;
        Ok(())
    }

    /// All pools in this session's partition.
    pub async fn pools(&self) -> Result<Vec<Pool>, BigIpError> {
        let list: Items<Pool> = self.get_json("/ltm/pool").await?;
        Ok(list
            .items
            .into_iter()
            .filter(|pool| pool.partition == self.partition)
            .collect())
    }

    /// A single pool by name.
    pub async fn get_pool(&self, name: &str) -> Result<Pool, BigIpError> {
        self.get_json(&format!("/ltm/pool/{}", self.full_path(name)))
            .await
    }

    /// Create an empty pool.
    pub async fn create_pool(&self, name: &str) -> Result<(), BigIpError> {
        let body = json!({ "name": name, "partition": self.partition });
        self.execute(Method::POST, "/ltm/pool", Some(body)).await?;
        Ok(())
    }

    /// Patch pool-level settings.
    pub async fn modify_pool(&self, name: &str, pool: &Pool) -> Result<(), BigIpError> {
        self.send_json(
            Method::PATCH,
            &format!("/ltm/pool/{}", self.full_path(name)),
            pool,
        )
        .await
    }

    /// Delete a pool.
    pub async fn delete_pool(&self, name: &str) -> Result<(), BigIpError> {
        self.execute(
            Method::DELETE,
            &format!("/ltm/pool/{}", self.full_path(name)),
            None,
        )
        .await?;
        Ok(())
    }

    /// Members of a pool.
    pub async fn pool_members(&self, pool: &str) -> Result<Vec<PoolMember>, BigIpError> {
        let list: Items<PoolMember> = self
            .get_json(&format!("/ltm/pool/{}/members", self.full_path(pool)))
            .await?;
        Ok(list.items)
    }

    /// Add a member (`{alias}:{port}`) to a pool.
    pub async fn add_pool_member(&self, pool: &str, member: &str) -> Result<(), BigIpError> {
        let body = json!({ "name": member, "partition": self.partition });
        self.execute(
            Method::POST,
            &format!("/ltm/pool/{}/members", self.full_path(pool)),
            Some(body),
        )
        .await?;
        Ok(())
    }

    /// Patch one member of a pool.
    pub async fn patch_pool_member(
        &self,
        pool: &str,
        member: &str,
        patch: &PoolMemberPatch,
    ) -> Result<(), BigIpError> {
        self.send_json(
            Method::PATCH,
            &format!(
                "/ltm/pool/{}/members/{}",
                self.full_path(pool),
                self.full_path(member)
            ),
            patch,
        )
        .await
    }

    /// Remove a member from a pool.
    pub async fn delete_pool_member(&self, pool: &str, member: &str) -> Result<(), BigIpError> {
        self.execute(
            Method::DELETE,
            &format!(
                "/ltm/pool/{}/members/{}",
                self.full_path(pool),
                self.full_path(member)
            ),
            None,
        )
        .await?;
        Ok(())
    }

    /// Create an HTTP(S) monitor. `scheme` is `http` or `https` and selects
    /// the monitor type.
    pub async fn create_monitor(
        &self,
        name: &str,
        scheme: &str,
        interval: u32,
        timeout: u32,
        send: &str,
        recv: &str,
    ) -> Result<(), BigIpError> {
        let body = json!({
            "name": name,
            "partition": self.partition,
            "interval": interval,
            "timeout": timeout,
            "send": send,
            "recv": recv,
        });
        self.execute(Method::POST, &format!("/ltm/monitor/{scheme}"), Some(body))
            .await?;
        Ok(())
    }

    /// Patch an existing monitor.
    pub async fn patch_monitor(
        &self,
        name: &str,
        scheme: &str,
        monitor: &Monitor,
    ) -> Result<(), BigIpError> {
        self.send_json(
            Method::PATCH,
            &format!("/ltm/monitor/{scheme}/{}", self.full_path(name)),
            monitor,
        )
        .await
    }

    /// Delete a monitor.
    pub async fn delete_monitor(&self, name: &str, scheme: &str) -> Result<(), BigIpError> {
        self.execute(
            Method::DELETE,
            &format!("/ltm/monitor/{scheme}/{}", self.full_path(name)),
            None,
        )
        .await?;
        Ok(())
    }

    /// Attach a monitor to a pool by reference.
    pub async fn attach_monitor(&self, pool: &str, monitor: &str) -> Result<(), BigIpError> {
        let body = json!({ "monitor": format!("/{}/{}", self.partition, monitor) });
        self.execute(
            Method::PATCH,
            &format!("/ltm/pool/{}", self.full_path(pool)),
            Some(body),
        )
        .await?;
        Ok(())
    }

    /// The device entry describing the node this session is connected to.
    pub async fn get_current_device(&self) -> Result<Device, BigIpError> {
        let list: Items<Device> = self.get_json("/cm/device").await?;
        list.items
            .into_iter()
            .find(Device::is_self)
            .ok_or_else(|| BigIpError::Api {
                status: 404,
                message: "no self device in /cm/device response".to_string(),
            })
    }

    /// Push the configuration of this node to a device group.
    pub async fn config_sync_to_group(&self, group: &str) -> Result<(), BigIpError> {
        let body = json!({
            "command": "run",
            "utilCmdArgs": format!("config-sync to-group {group}"),
        });
        self.execute(Method::POST, "/cm", Some(body)).await?;
        Ok(())
    }
}
