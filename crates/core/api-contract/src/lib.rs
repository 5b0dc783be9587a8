//! 远端资源 API 的稳定 DTO、路径与查询条件。

use serde::{Deserialize, Serialize};

/// API 基础路径。
pub const API_BASE: &str = "/api/";

/// 会话资源集合。
pub const SESSION_COLLECTION: &str = "session";
/// 凭据资源集合（VPN 凭据在此集合中检索）。
pub const CREDENTIAL_COLLECTION: &str = "credential";

/// 读取设备记录时选取的字段。
pub const DEVICE_REQUIRED_FIELDS: &[&str] = &[
    "id",
    "state",
    "owner",
    "nuvlabox-status",
    "refresh-interval",
    "heartbeat-interval",
    "infrastructure-service-group",
    "credential-api-key",
    "vpn-server-id",
    "capabilities",
];

/// 首次完整同步之后，读取状态记录时只选取的字段。
pub const STATUS_REQUIRED_FIELDS: &[&str] = &["node-id"];

/// VPN 凭据创建方法名。
pub const VPN_CREDENTIAL_METHOD: &str = "create-credential-vpn-nuvlabox";

/// 资源操作（`{resource-id}/{operation}`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Activate,
    Commission,
    Heartbeat,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Activate => "activate",
            Operation::Commission => "commission",
            Operation::Heartbeat => "heartbeat",
        }
    }
}

/// 拼接资源或集合的完整 URL。
pub fn resource_url(endpoint: &str, resource: &str) -> String {
    format!(
        "{}{}{}",
        endpoint.trim_end_matches('/'),
        API_BASE,
        resource.trim_start_matches('/')
    )
}

/// 拼接资源操作的完整 URL。
pub fn operation_url(endpoint: &str, resource_id: &str, operation: Operation) -> String {
    resource_url(
        endpoint,
        &format!("{}/{}", resource_id.trim_end_matches('/'), operation.as_str()),
    )
}

/// VPN 凭据检索条件：按设备 id 与 VPN 服务端 id 过滤。
pub fn vpn_credential_filter(device_id: &str, vpn_server_id: &str) -> String {
    format!(
        "method=\"{}\" and vpn-common-name=\"{}\" and parent=\"{}\"",
        VPN_CREDENTIAL_METHOD, device_id, vpn_server_id
    )
}

/// 激活响应体。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActivationResponse {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

/// API key 登录请求体。
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub template: LoginTemplate,
}

/// 登录模板。
#[derive(Debug, Clone, Serialize)]
pub struct LoginTemplate {
    pub href: String,
    pub key: String,
    pub secret: String,
}

impl LoginRequest {
    pub fn api_key(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            template: LoginTemplate {
                href: "session-template/api-key".to_string(),
                key: key.into(),
                secret: secret.into(),
            },
        }
    }
}

/// 集合检索响应体。
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
}

/// 心跳 / 遥测等操作的响应体（只关心排队的 job）。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OperationResponse {
    #[serde(default)]
    pub jobs: Vec<String>,
    #[serde(default)]
    pub doc_last_updated: Option<String>,
}
