//! Agent 运行配置加载。

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 编排引擎类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoeKind {
    Swarm,
    Kubernetes,
}

/// Agent 运行配置。
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_endpoint: String,
    pub api_insecure: bool,
    /// 设备记录 id；存在会话文件时可省略。
    pub device_id: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub data_dir: PathBuf,
    pub min_sync_seconds: u64,
    pub commission_period_seconds: u64,
    pub vpn_period_seconds: u64,
    pub heartbeat_period_seconds: u64,
    pub status_period_seconds: u64,
    pub status_timeout_seconds: u64,
    pub vpn_enabled: bool,
    pub vpn_interface_name: String,
    pub vpn_extra_config: Option<String>,
    pub vpn_credential_timeout_seconds: u64,
    pub coe_api_host: Option<String>,
    pub coe_api_port: u16,
    pub coe_kind: CoeKind,
    pub vpn_client_present: bool,
}

/// 数据目录下的持久化文件位置。
#[derive(Debug, Clone)]
pub struct AgentPaths {
    pub session: PathBuf,
    pub commissioned_data: PathBuf,
    pub tls_ca: PathBuf,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    pub vpn_dir: PathBuf,
    pub vpn_ip: PathBuf,
}

impl AgentConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（便于测试，不修改进程环境）。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = Reader { lookup: &lookup };

        let api_endpoint = reader
            .optional("EDGE_API_ENDPOINT")
            .unwrap_or_else(|| "https://nuvla.io".to_string());
        let api_insecure = reader.bool_with_default("EDGE_API_INSECURE", false);
        let device_id = reader.optional("EDGE_DEVICE_ID");
        let api_key = reader.optional("EDGE_API_KEY");
        let api_secret = reader.optional("EDGE_API_SECRET");
        if api_key.is_some() != api_secret.is_some() {
            return Err(ConfigError::Missing(
                if api_key.is_some() { "EDGE_API_SECRET" } else { "EDGE_API_KEY" }.to_string(),
            ));
        }
        let data_dir = PathBuf::from(
            reader
                .optional("EDGE_DATA_DIR")
                .unwrap_or_else(|| "/var/lib/nuvlaedge".to_string()),
        );
        let min_sync_seconds = reader.u64_with_default("EDGE_MIN_SYNC_SECONDS", 60)?;
        let commission_period_seconds =
            reader.positive_u64_with_default("EDGE_COMMISSION_PERIOD_SECONDS", 60)?;
        let vpn_period_seconds = reader.positive_u64_with_default("EDGE_VPN_PERIOD_SECONDS", 120)?;
        let heartbeat_period_seconds =
            reader.positive_u64_with_default("EDGE_HEARTBEAT_PERIOD_SECONDS", 20)?;
        let status_period_seconds =
            reader.positive_u64_with_default("EDGE_STATUS_PERIOD_SECONDS", 30)?;
        let status_timeout_seconds =
            reader.positive_u64_with_default("EDGE_STATUS_TIMEOUT_SECONDS", 3600)?;
        let vpn_enabled = reader.bool_with_default("EDGE_VPN_ENABLED", true);
        let vpn_interface_name = reader
            .optional("EDGE_VPN_INTERFACE_NAME")
            .unwrap_or_else(|| "vpn".to_string());
        // 显式设置为空字符串表示清空额外配置，因此这里不过滤空值。
        let vpn_extra_config = (reader.lookup)("EDGE_VPN_EXTRA_CONFIG");
        let vpn_credential_timeout_seconds =
            reader.positive_u64_with_default("EDGE_VPN_CREDENTIAL_TIMEOUT_SECONDS", 75)?;
        let coe_api_host = reader.optional("EDGE_COE_API_HOST");
        let coe_api_port = reader.u16_with_default("EDGE_COE_API_PORT", 5000)?;
        let coe_kind = match reader.optional("EDGE_COE_KIND") {
            None => CoeKind::Swarm,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "swarm" | "docker" => CoeKind::Swarm,
                "kubernetes" | "k8s" => CoeKind::Kubernetes,
                _ => return Err(ConfigError::Invalid("EDGE_COE_KIND".to_string(), value)),
            },
        };
        let vpn_client_present = reader.bool_with_default("EDGE_VPN_CLIENT_PRESENT", true);

        Ok(Self {
            api_endpoint,
            api_insecure,
            device_id,
            api_key,
            api_secret,
            data_dir,
            min_sync_seconds,
            commission_period_seconds,
            vpn_period_seconds,
            heartbeat_period_seconds,
            status_period_seconds,
            status_timeout_seconds,
            vpn_enabled,
            vpn_interface_name,
            vpn_extra_config,
            vpn_credential_timeout_seconds,
            coe_api_host,
            coe_api_port,
            coe_kind,
            vpn_client_present,
        })
    }

    pub fn paths(&self) -> AgentPaths {
        let tls = self.data_dir.join("tls");
        let vpn_dir = self.data_dir.join("vpn");
        AgentPaths {
            session: self.data_dir.join("session.json"),
            commissioned_data: self.data_dir.join("commissioned_data.json"),
            tls_ca: tls.join("ca.pem"),
            tls_cert: tls.join("cert.pem"),
            tls_key: tls.join("key.pem"),
            vpn_ip: vpn_dir.join("ip"),
            vpn_dir,
        }
    }

    pub fn min_sync_interval(&self) -> Duration {
        Duration::from_secs(self.min_sync_seconds)
    }

    pub fn vpn_credential_timeout(&self) -> Duration {
        Duration::from_secs(self.vpn_credential_timeout_seconds)
    }
}

struct Reader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Reader<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        match (self.lookup)(key) {
            Some(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    fn u64_with_default(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        let value = match self.optional(key) {
            Some(value) => value,
            None => return Ok(default),
        };
        value
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), value))
    }

    /// 周期类配置不允许为 0。
    fn positive_u64_with_default(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        let value = self.u64_with_default(key, default)?;
        if value == 0 {
            return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
        }
        Ok(value)
    }

    fn u16_with_default(&self, key: &str, default: u16) -> Result<u16, ConfigError> {
        let value = match self.optional(key) {
            Some(value) => value,
            None => return Ok(default),
        };
        value
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), value))
    }

    fn bool_with_default(&self, key: &str, default: bool) -> bool {
        match self.optional(key) {
            Some(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
            None => default,
        }
    }
}
