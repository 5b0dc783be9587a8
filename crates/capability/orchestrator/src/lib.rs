//! 编排引擎（COE）能力抽象。
//!
//! 对账器与 VPN 管理器只通过 [`Orchestrator`] 读取集群信息、API 地址与 VPN 客户端状态；
//! 具体的 Docker / Kubernetes 巡检不在本 workspace 内。

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;

pub type AttributeMap = BTreeMap<String, Value>;

/// 编排引擎错误。
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("orchestrator unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorKind {
    Swarm,
    Kubernetes,
}

impl OrchestratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorKind::Swarm => "swarm",
            OrchestratorKind::Kubernetes => "kubernetes",
        }
    }
}

/// 本地 VPN 客户端进程状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpnClientState {
    /// 设备未安装 VPN 客户端。
    Missing,
    Stopped,
    Running,
}

/// 编排引擎 API 客户端 TLS 材料。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca: String,
    pub cert: String,
    pub key: String,
}

/// 编排引擎 API 地址；host 与 port 可分别缺失。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiAddress {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTokens {
    pub manager: String,
    pub worker: String,
}

/// 编排引擎能力。
#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn kind(&self) -> OrchestratorKind;

    /// 集群信息（cluster-id / managers / workers ...）。不属于集群时为空。
    ///
    /// 返回内容按原样使用，调用方不推断节点角色。
    async fn cluster_info(&self, default_cluster_name: &str)
    -> Result<AttributeMap, OrchestratorError>;

    async fn api_address(&self) -> ApiAddress;

    /// Swarm join token；非 Swarm 或不可用时为 `None`。
    async fn join_tokens(&self) -> Option<JoinTokens> {
        None
    }

    async fn vpn_client_state(&self) -> VpnClientState;

    fn has_pull_job_capability(&self) -> bool;

    /// 编排引擎自检发现的问题，每条一行。
    async fn system_issues(&self) -> Vec<String> {
        Vec::new()
    }

    /// 基础设施服务描述（endpoint + 客户端 TLS 材料）。
    fn infra_service(&self, endpoint: &str, tls: Option<&TlsMaterial>) -> AttributeMap {
        define_infra_service(self.kind(), endpoint, tls)
    }
}

/// 按编排引擎类型生成 `<kind>-endpoint` / `<kind>-client-*` 字段。
///
/// endpoint 为 `local` 时缺失的 TLS 字段以字符串 `null` 占位。
pub fn define_infra_service(
    kind: OrchestratorKind,
    endpoint: &str,
    tls: Option<&TlsMaterial>,
) -> AttributeMap {
    let prefix = kind.as_str();
    let mut service = AttributeMap::new();
    service.insert(
        format!("{}-endpoint", prefix),
        Value::String(endpoint.to_string()),
    );
    match tls {
        Some(tls) => {
            service.insert(format!("{}-client-ca", prefix), Value::String(tls.ca.clone()));
            service.insert(
                format!("{}-client-cert", prefix),
                Value::String(tls.cert.clone()),
            );
            service.insert(format!("{}-client-key", prefix), Value::String(tls.key.clone()));
        }
        None if endpoint == LOCAL_ENDPOINT => {
            for field in ["client-ca", "client-cert", "client-key"] {
                service.insert(format!("{}-{}", prefix, field), Value::String("null".to_string()));
            }
        }
        None => {}
    }
    service
}

/// 无法确定外部可达地址时使用的 endpoint。
pub const LOCAL_ENDPOINT: &str = "local";

/// 由配置给定的编排引擎能力，字段可在运行期替换。
pub struct StaticOrchestrator {
    kind: OrchestratorKind,
    state: RwLock<StaticState>,
}

#[derive(Clone)]
struct StaticState {
    api_address: ApiAddress,
    cluster_info: AttributeMap,
    join_tokens: Option<JoinTokens>,
    vpn_client: VpnClientState,
    pull_job: bool,
    issues: Vec<String>,
}

impl StaticOrchestrator {
    pub fn new(kind: OrchestratorKind) -> Self {
        Self {
            kind,
            state: RwLock::new(StaticState {
                api_address: ApiAddress::default(),
                cluster_info: AttributeMap::new(),
                join_tokens: None,
                vpn_client: VpnClientState::Missing,
                pull_job: false,
                issues: Vec::new(),
            }),
        }
    }

    pub fn with_api_address(self, host: Option<String>, port: Option<u16>) -> Self {
        self.update(|state| state.api_address = ApiAddress { host, port });
        self
    }

    pub fn with_vpn_client(self, vpn_client: VpnClientState) -> Self {
        self.update(|state| state.vpn_client = vpn_client);
        self
    }

    pub fn with_pull_job(self, pull_job: bool) -> Self {
        self.update(|state| state.pull_job = pull_job);
        self
    }

    pub fn set_cluster_info(&self, cluster_info: AttributeMap) {
        self.update(|state| state.cluster_info = cluster_info);
    }

    pub fn set_join_tokens(&self, tokens: Option<JoinTokens>) {
        self.update(|state| state.join_tokens = tokens);
    }

    pub fn set_vpn_client(&self, vpn_client: VpnClientState) {
        self.update(|state| state.vpn_client = vpn_client);
    }

    pub fn set_issues(&self, issues: Vec<String>) {
        self.update(|state| state.issues = issues);
    }

    fn update(&self, apply: impl FnOnce(&mut StaticState)) {
        if let Ok(mut state) = self.state.write() {
            apply(&mut state);
        }
    }

    fn snapshot(&self) -> Option<StaticState> {
        self.state.read().ok().map(|state| state.clone())
    }
}

#[async_trait]
impl Orchestrator for StaticOrchestrator {
    fn kind(&self) -> OrchestratorKind {
        self.kind
    }

    async fn cluster_info(
        &self,
        _default_cluster_name: &str,
    ) -> Result<AttributeMap, OrchestratorError> {
        self.snapshot()
            .map(|state| state.cluster_info)
            .ok_or_else(|| OrchestratorError::Unavailable("state lock poisoned".to_string()))
    }

    async fn api_address(&self) -> ApiAddress {
        self.snapshot()
            .map(|state| state.api_address)
            .unwrap_or_default()
    }

    async fn join_tokens(&self) -> Option<JoinTokens> {
        if self.kind != OrchestratorKind::Swarm {
            return None;
        }
        self.snapshot().and_then(|state| state.join_tokens)
    }

    async fn vpn_client_state(&self) -> VpnClientState {
        self.snapshot()
            .map(|state| state.vpn_client)
            .unwrap_or(VpnClientState::Missing)
    }

    fn has_pull_job_capability(&self) -> bool {
        self.snapshot().is_some_and(|state| state.pull_job)
    }

    async fn system_issues(&self) -> Vec<String> {
        self.snapshot().map(|state| state.issues).unwrap_or_default()
    }
}
