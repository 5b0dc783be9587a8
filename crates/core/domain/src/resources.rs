//! 控制面持有的远端资源（本地只保存只读副本）。

use serde::{Deserialize, Deserializer, Serialize};

/// 设备生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    New,
    Activated,
    Commissioned,
    Decommissioning,
    Decommissioned,
    /// 本地无法识别的状态。
    #[default]
    #[serde(other)]
    Unknown,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::New => "NEW",
            DeviceState::Activated => "ACTIVATED",
            DeviceState::Commissioned => "COMMISSIONED",
            DeviceState::Decommissioning => "DECOMMISSIONING",
            DeviceState::Decommissioned => "DECOMMISSIONED",
            DeviceState::Unknown => "UNKNOWN",
        }
    }

    /// 设备已被控制面下线（或正在下线），Agent 不应继续运行。
    pub fn is_decommissioned(&self) -> bool {
        matches!(
            self,
            DeviceState::Decommissioning | DeviceState::Decommissioned
        )
    }
}

/// 设备记录。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceRecord {
    pub id: String,
    #[serde(default)]
    pub state: DeviceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_server_id: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// 设备状态记录 id。
    #[serde(
        rename = "nuvlabox-status",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_service_group: Option<String>,
}

/// 设备状态记录（高频变化，只关心少量字段）。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// VPN 凭据（commission 之后由控制面创建）。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CredentialResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_certificate_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_intermediate_ca: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl CredentialResource {
    /// 凭据已签发证书。
    pub fn is_issued(&self) -> bool {
        self.vpn_certificate
            .as_deref()
            .is_some_and(|cert| !cert.trim().is_empty())
    }
}

/// VPN 服务端描述（基础设施服务）。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_ca_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_intermediate_ca: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_common_name_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_shared_key: Option<String>,
    #[serde(default)]
    pub vpn_endpoints: Vec<VpnEndpoint>,
}

/// VPN 服务端接入点。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnEndpoint {
    pub endpoint: String,
    #[serde(deserialize_with = "port_as_string")]
    pub port: String,
    pub protocol: String,
}

/// 端口在不同版本的控制面中可能是字符串或数字。
fn port_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(text) => text,
        Port::Number(number) => number.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_record_parses_kebab_case() {
        let raw = r#"{
            "id": "nuvlabox/abc",
            "state": "COMMISSIONED",
            "vpn-server-id": "infrastructure-service/vpn-1",
            "nuvlabox-status": "nuvlabox-status/xyz",
            "heartbeat-interval": 20,
            "capabilities": ["NUVLA_HEARTBEAT"]
        }"#;
        let device: DeviceRecord = serde_json::from_str(raw).expect("device");
        assert_eq!(device.state, DeviceState::Commissioned);
        assert_eq!(device.vpn_server_id.as_deref(), Some("infrastructure-service/vpn-1"));
        assert_eq!(device.status_id.as_deref(), Some("nuvlabox-status/xyz"));
        assert_eq!(device.heartbeat_interval, Some(20));
    }

    #[test]
    fn unknown_state_maps_to_unknown() {
        let device: DeviceRecord =
            serde_json::from_str(r#"{"id":"nuvlabox/abc","state":"SUSPENDED"}"#).expect("device");
        assert_eq!(device.state, DeviceState::Unknown);
    }

    #[test]
    fn endpoint_port_accepts_number_and_string() {
        let server: ServerResource = serde_json::from_str(
            r#"{"vpn-endpoints":[
                {"endpoint":"10.0.0.1","port":1194,"protocol":"udp"},
                {"endpoint":"vpn.example.com","port":"443","protocol":"tcp"}
            ]}"#,
        )
        .expect("server");
        assert_eq!(server.vpn_endpoints[0].port, "1194");
        assert_eq!(server.vpn_endpoints[1].port, "443");
    }

    #[test]
    fn credential_without_certificate_is_not_issued() {
        let credential = CredentialResource {
            vpn_certificate: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!credential.is_issued());
    }
}
