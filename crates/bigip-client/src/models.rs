//! iControl REST payload types

use serde::{Deserialize, Serialize};

/// Collection wrapper used by iControl list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Items<T> {
    /// The listed objects. Absent when the collection is empty.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// An LTM pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    /// Pool name, `{host}_{port}` for pools owned by route-lb.
    pub name: String,

    /// Administrative partition the pool lives in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Load balancing mode, e.g. `round-robin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing_mode: Option<String>,

    /// Priority group activation threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_active_members: Option<u32>,

    /// Attached monitor reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,

    /// Full path, `/{partition}/{name}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
}

/// A member of an LTM pool, named `{alias}:{port}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMember {
    /// Member name.
    pub name: String,

    /// Administrative partition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Full path, `/{partition}/{name}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,

    /// Session state: `user-enabled` or `user-disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Role priority group of the member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_group: Option<i32>,
}

/// Patch body for a pool member.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMemberPatch {
    /// Session state: `user-enabled` or `user-disabled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Role priority group of the member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_group: Option<i32>,
}

/// An HTTP(S) health monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    /// Monitor name, `{host}_{port}` for monitors owned by route-lb.
    pub name: String,

    /// Administrative partition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Probe interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,

    /// Probe timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    /// Raw request string sent by the probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<String>,

    /// Regex matched against the probe response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv: Option<String>,
}

/// A device in the BIG-IP cluster.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Device name.
    pub name: String,

    /// Failover state: `active` or `standby`.
    #[serde(default)]
    pub failover_state: String,

    /// `"true"` when this entry describes the device answering the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_device: Option<String>,
}

impl Device {
    /// Whether this entry is the device the session is connected to.
    pub fn is_self(&self) -> bool {
        self.self_device.as_deref() == Some("true")
    }
}

/// Error payload returned by iControl.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// iControl error code.
    #[serde(default)]
    pub code: u32,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_deserializes_from_icontrol_payload() {
        let json = r#"{
            "name": "foo.test.com_80",
            "partition": "Common",
            "fullPath": "/Common/foo.test.com_80",
            "loadBalancingMode": "round-robin",
            "minActiveMembers": 1,
            "monitor": "/Common/foo.test.com_80"
        }"#;
        let pool: Pool = serde_json::from_str(json).unwrap();
        assert_eq!(pool.name, "foo.test.com_80");
        assert_eq!(pool.load_balancing_mode.as_deref(), Some("round-robin"));
        assert_eq!(pool.min_active_members, Some(1));
    }

    #[test]
    fn empty_collection_has_no_items_key() {
        let list: Items<Pool> = serde_json::from_str("{}").unwrap();
        assert!(list.items.is_empty());
    }

    #[test]
    fn device_self_flag() {
        let json = r#"{"name": "bigip1", "failoverState": "standby", "selfDevice": "true"}"#;
        let device: Device = serde_json::from_str(json).unwrap();
        assert!(device.is_self());
        assert_eq!(device.failover_state, "standby");
    }

    #[test]
    fn member_patch_skips_unset_fields() {
        let patch = PoolMemberPatch {
            session: Some("user-disabled".to_string()),
            priority_group: None,
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"session":"user-disabled"}"#);
    }
}
