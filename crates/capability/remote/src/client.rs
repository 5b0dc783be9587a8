//! 远端资源客户端：带 TTL 缓存的资源读取、激活、commission 与心跳。

use crate::error::RemoteError;
use crate::transport::ApiTransport;
use api_contract::{
    ActivationResponse, CREDENTIAL_COLLECTION, DEVICE_REQUIRED_FIELDS, Operation,
    STATUS_REQUIRED_FIELDS, vpn_credential_filter,
};
use domain::persist::{read_json, write_json_atomic};
use domain::session::format_host;
use domain::{
    ApiKeyCredentials, CredentialResource, DeviceRecord, PersistError, ServerResource, Session,
    StatusRecord,
};
use edge_telemetry::{record_cache_hit, record_resource_fetch};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 资源缓存的默认最短同步间隔。
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(60);
/// 状态记录强制完整同步的间隔。
pub const FULL_RESOURCE_SYNC: Duration = Duration::from_secs(15 * 60);

/// 客户端管理的远端资源种类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Device,
    DeviceStatus,
    VpnCredential,
    VpnServer,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Device => "device",
            ResourceKind::DeviceStatus => "device-status",
            ResourceKind::VpnCredential => "vpn-credential",
            ResourceKind::VpnServer => "vpn-server",
        }
    }
}

/// 资源读取结果。VPN 凭据与服务端在首次 VPN commission 之前可能不存在。
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Device(DeviceRecord),
    DeviceStatus(StatusRecord),
    VpnCredential(Option<CredentialResource>),
    VpnServer(Option<ServerResource>),
}

struct Cached {
    value: Resource,
    synced_at: Instant,
}

/// 客户端构造参数。
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub endpoint: String,
    pub insecure: bool,
    pub device_id: String,
    pub session_path: PathBuf,
    pub min_sync_interval: Duration,
}

struct Identity {
    credentials: Option<ApiKeyCredentials>,
    status_id: Option<String>,
    last_full_status_sync: Option<Instant>,
}

pub struct RemoteClient {
    transport: Arc<dyn ApiTransport>,
    endpoint: String,
    insecure: bool,
    device_id: String,
    session_path: PathBuf,
    min_sync_interval: Duration,
    identity: Mutex<Identity>,
    cache: Mutex<HashMap<ResourceKind, Cached>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn decode<T: DeserializeOwned>(kind: ResourceKind, value: Value) -> Result<T, RemoteError> {
    serde_json::from_value(value)
        .map_err(|err| RemoteError::Decode(format!("{}: {}", kind.as_str(), err)))
}

impl RemoteClient {
    pub fn new(options: ClientOptions, transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            transport,
            endpoint: format_host(&options.endpoint),
            insecure: options.insecure,
            device_id: options.device_id,
            session_path: options.session_path,
            min_sync_interval: options.min_sync_interval,
            identity: Mutex::new(Identity {
                credentials: None,
                status_id: None,
                last_full_status_sync: None,
            }),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 读取会话文件；文件不存在时返回 `None`，内容不合法时返回 `SessionValidation`。
    pub fn load_session(path: &Path) -> Result<Option<Session>, RemoteError> {
        match read_json::<Session>(path) {
            Ok(session) => Ok(session),
            Err(PersistError::Json { source, .. }) => {
                warn!(target: "edge.remote", path = %path.display(), "session_invalid");
                Err(RemoteError::SessionValidation(source.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 由已保存的会话恢复客户端并登录，跳过激活。
    pub async fn from_session(
        session: Session,
        session_path: PathBuf,
        transport: Arc<dyn ApiTransport>,
        min_sync_interval: Duration,
    ) -> Result<Self, RemoteError> {
        let device_id = session.device_id.clone().ok_or_else(|| {
            RemoteError::SessionValidation("session has no device id".to_string())
        })?;
        let client = Self::new(
            ClientOptions {
                endpoint: session.endpoint.clone(),
                insecure: session.insecure,
                device_id,
                session_path,
                min_sync_interval,
            },
            transport,
        );
        {
            let mut identity = lock(&client.identity);
            identity.credentials = session.credentials;
            identity.status_id = session.status_id;
        }
        info!(
            target: "edge.remote",
            device_id = %client.device_id,
            endpoint = %client.endpoint,
            "session_restored"
        );
        if let Err(err) = client.login().await {
            warn!(target: "edge.remote", device_id = %client.device_id, "login failed: {}", err);
        }
        Ok(client)
    }

    /// 注入预先分发的 API key（不落盘，激活时一并持久化）。
    pub fn set_credentials(&self, credentials: ApiKeyCredentials) {
        lock(&self.identity).credentials = Some(credentials);
    }

    pub fn has_credentials(&self) -> bool {
        lock(&self.identity).credentials.is_some()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn status_id(&self) -> Option<String> {
        lock(&self.identity).status_id.clone()
    }

    /// 读取资源：距上次同步未超过最短同步间隔时直接返回缓存副本。
    pub async fn get(&self, kind: ResourceKind) -> Result<Resource, RemoteError> {
        if let Some(value) = self.fresh(kind) {
            return Ok(value);
        }
        let value = self.fetch(kind).await?;
        self.store(kind, value.clone());
        Ok(value)
    }

    fn fresh(&self, kind: ResourceKind) -> Option<Resource> {
        let cache = lock(&self.cache);
        let cached = cache.get(&kind)?;
        if cached.synced_at.elapsed() > self.min_sync_interval {
            return None;
        }
        record_cache_hit();
        Some(cached.value.clone())
    }

    fn store(&self, kind: ResourceKind, value: Resource) {
        lock(&self.cache).insert(
            kind,
            Cached {
                value,
                synced_at: Instant::now(),
            },
        );
    }

    /// 丢弃缓存，下一次读取必然访问远端。
    pub fn invalidate(&self, kind: ResourceKind) {
        lock(&self.cache).remove(&kind);
    }

    /// 强制重新拉取资源。
    pub async fn refresh(&self, kind: ResourceKind) -> Result<Resource, RemoteError> {
        self.invalidate(kind);
        self.get(kind).await
    }

    pub async fn device(&self) -> Result<DeviceRecord, RemoteError> {
        match self.get(ResourceKind::Device).await? {
            Resource::Device(device) => Ok(device),
            other => Err(unexpected(ResourceKind::Device, &other)),
        }
    }

    pub async fn device_status(&self) -> Result<StatusRecord, RemoteError> {
        match self.get(ResourceKind::DeviceStatus).await? {
            Resource::DeviceStatus(status) => Ok(status),
            other => Err(unexpected(ResourceKind::DeviceStatus, &other)),
        }
    }

    pub async fn vpn_credential(&self) -> Result<Option<CredentialResource>, RemoteError> {
        match self.get(ResourceKind::VpnCredential).await? {
            Resource::VpnCredential(credential) => Ok(credential),
            other => Err(unexpected(ResourceKind::VpnCredential, &other)),
        }
    }

    pub async fn vpn_server(&self) -> Result<Option<ServerResource>, RemoteError> {
        match self.get(ResourceKind::VpnServer).await? {
            Resource::VpnServer(server) => Ok(server),
            other => Err(unexpected(ResourceKind::VpnServer, &other)),
        }
    }

    async fn fetch(&self, kind: ResourceKind) -> Result<Resource, RemoteError> {
        record_resource_fetch();
        debug!(target: "edge.remote", resource = kind.as_str(), "resource_fetch");
        match kind {
            ResourceKind::Device => self.fetch_device().await.map(Resource::Device),
            ResourceKind::DeviceStatus => {
                let status_id = self.resolve_status_id().await?;
                let full_sync = {
                    let identity = lock(&self.identity);
                    identity
                        .last_full_status_sync
                        .is_none_or(|at| at.elapsed() > FULL_RESOURCE_SYNC)
                };
                let select = if full_sync {
                    None
                } else {
                    Some(STATUS_REQUIRED_FIELDS)
                };
                let raw = self.transport.get(&status_id, select).await?;
                let status: StatusRecord = decode(kind, raw)?;
                if full_sync {
                    lock(&self.identity).last_full_status_sync = Some(Instant::now());
                }
                Ok(Resource::DeviceStatus(status))
            }
            ResourceKind::VpnCredential => {
                let Some(server_id) = self.cached_device().await?.vpn_server_id else {
                    warn!(target: "edge.remote", device_id = %self.device_id, "vpn_server_missing");
                    return Ok(Resource::VpnCredential(None));
                };
                let filter = vpn_credential_filter(&self.device_id, &server_id);
                let found = self
                    .transport
                    .search(CREDENTIAL_COLLECTION, &filter)
                    .await?
                    .into_iter()
                    .next();
                let credential = match found {
                    Some(raw) => Some(decode(kind, raw)?),
                    None => None,
                };
                Ok(Resource::VpnCredential(credential))
            }
            ResourceKind::VpnServer => {
                let Some(server_id) = self.cached_device().await?.vpn_server_id else {
                    warn!(target: "edge.remote", device_id = %self.device_id, "vpn_server_missing");
                    return Ok(Resource::VpnServer(None));
                };
                match self.transport.get(&server_id, None).await {
                    Ok(raw) => Ok(Resource::VpnServer(Some(decode(kind, raw)?))),
                    Err(err) if err.is_not_found() => Ok(Resource::VpnServer(None)),
                    Err(err) => Err(err),
                }
            }
        }
    }

    async fn fetch_device(&self) -> Result<DeviceRecord, RemoteError> {
        let raw = self
            .transport
            .get(&self.device_id, Some(DEVICE_REQUIRED_FIELDS))
            .await?;
        let device: DeviceRecord = decode(ResourceKind::Device, raw)?;
        if let Some(status_id) = &device.status_id {
            lock(&self.identity).status_id = Some(status_id.clone());
        }
        Ok(device)
    }

    /// 供其它资源的拉取使用的设备记录读取（同样遵守缓存）。
    async fn cached_device(&self) -> Result<DeviceRecord, RemoteError> {
        if let Some(Resource::Device(device)) = self.fresh(ResourceKind::Device) {
            return Ok(device);
        }
        record_resource_fetch();
        let device = self.fetch_device().await?;
        self.store(ResourceKind::Device, Resource::Device(device.clone()));
        Ok(device)
    }

    async fn resolve_status_id(&self) -> Result<String, RemoteError> {
        if let Some(status_id) = self.status_id() {
            return Ok(status_id);
        }
        self.cached_device()
            .await?
            .status_id
            .ok_or_else(|| RemoteError::Missing("nuvlabox-status".to_string()))
    }

    /// 登录；没有凭据时返回 `Activation` 错误。
    pub async fn login(&self) -> Result<(), RemoteError> {
        let credentials = lock(&self.identity).credentials.clone().ok_or_else(|| {
            RemoteError::Activation("no api key credentials available".to_string())
        })?;
        self.transport
            .login_api_key(&credentials.key, &credentials.secret)
            .await?;
        debug!(target: "edge.remote", device_id = %self.device_id, "login_succeeded");
        Ok(())
    }

    /// 激活设备：换取 API key、持久化会话并登录。
    ///
    /// 远端拒绝激活（例如设备已激活）时使用本地已有凭据；两者都没有时失败。
    pub async fn activate(&self) -> Result<(), RemoteError> {
        info!(target: "edge.remote", device_id = %self.device_id, "activation_started");
        let response = match self
            .transport
            .operation(&self.device_id, Operation::Activate, None)
            .await
        {
            Ok(raw) => serde_json::from_value::<ActivationResponse>(raw).unwrap_or_default(),
            Err(err) => {
                warn!(target: "edge.remote", device_id = %self.device_id, "activate call failed: {}", err);
                ActivationResponse::default()
            }
        };
        {
            let mut identity = lock(&self.identity);
            match (response.api_key, response.secret_key) {
                (Some(key), Some(secret)) => {
                    info!(target: "edge.remote", api_key = %key, "activation_credentials_received");
                    identity.credentials = Some(ApiKeyCredentials { key, secret });
                }
                _ if identity.credentials.is_some() => {
                    info!(target: "edge.remote", "activation_using_local_credentials");
                }
                _ => {
                    return Err(RemoteError::Activation(
                        "credentials absent locally and in activation response".to_string(),
                    ));
                }
            }
        }
        self.save_session()?;
        if let Err(err) = self.login().await {
            warn!(target: "edge.remote", device_id = %self.device_id, "login after activation failed: {}", err);
        }
        self.invalidate(ResourceKind::Device);
        Ok(())
    }

    /// 原子写入当前会话。
    pub fn save_session(&self) -> Result<(), RemoteError> {
        let session = {
            let identity = lock(&self.identity);
            Session {
                endpoint: self.endpoint.clone(),
                insecure: self.insecure,
                credentials: identity.credentials.clone(),
                device_id: Some(self.device_id.clone()),
                status_id: identity.status_id.clone(),
            }
        };
        write_json_atomic(&self.session_path, &session)?;
        Ok(())
    }

    /// 提交 commissioning 请求；失败时记录日志并返回 `None`。
    pub async fn commission(&self, payload: Map<String, Value>) -> Option<Value> {
        let fields: Vec<&String> = payload.keys().collect();
        debug!(target: "edge.remote", device_id = %self.device_id, ?fields, "commission_request");
        match self
            .transport
            .operation(
                &self.device_id,
                Operation::Commission,
                Some(Value::Object(payload)),
            )
            .await
        {
            Ok(response) => {
                self.invalidate(ResourceKind::Device);
                Some(response)
            }
            Err(err) => {
                warn!(target: "edge.remote", device_id = %self.device_id, "commission failed: {}", err);
                None
            }
        }
    }

    /// 发送心跳；响应中包含排队的 job。失败时返回 `None`。
    pub async fn heartbeat(&self) -> Option<Value> {
        match self
            .transport
            .operation(&self.device_id, Operation::Heartbeat, None)
            .await
        {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(target: "edge.remote", device_id = %self.device_id, "heartbeat failed: {}", err);
                None
            }
        }
    }

    /// 推送遥测增量到状态记录，并清除不再上报的字段。
    pub async fn telemetry(
        &self,
        delta: Map<String, Value>,
        fields_to_clear: &[String],
    ) -> Result<Value, RemoteError> {
        let status_id = self.resolve_status_id().await?;
        debug!(
            target: "edge.remote",
            status_id = %status_id,
            changed = delta.len(),
            cleared = fields_to_clear.len(),
            "telemetry_push"
        );
        self.transport
            .edit(&status_id, Value::Object(delta), fields_to_clear)
            .await
    }
}

fn unexpected(kind: ResourceKind, value: &Resource) -> RemoteError {
    RemoteError::Decode(format!(
        "expected {} resource, cached {:?}",
        kind.as_str(),
        value
    ))
}
