//! 持久化会话：激活后写入，重启时读取以避免重复激活。

use serde::{Deserialize, Serialize};

/// 控制面默认地址。
pub const DEFAULT_ENDPOINT: &str = "https://nuvla.io";

/// 激活时换取的 API key / secret。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyCredentials {
    pub key: String,
    pub secret: String,
}

/// 会话文件内容。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Session {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<ApiKeyCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// 补全 scheme（未指定时按 https 处理）。
pub fn format_host(host: &str) -> String {
    if host.starts_with("https://") || host.starts_with("http://") {
        return host.trim_end_matches('/').to_string();
    }
    format!("https://{}", host.trim_end_matches('/'))
}
