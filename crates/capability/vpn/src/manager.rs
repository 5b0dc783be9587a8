//! VPN 生命周期：NO_VPN_SERVER / CERT_NEEDED / AWAITING_CREDENTIAL / CONFIGURED。
//!
//! 每轮：确认本地 VPN 客户端存在 → 判断是否需要重新签发 → 生成私钥与 CSR →
//! 经 [`CsrSlot`] 交给 commissioning 协调器 → 有界等待凭据 → 原子写入客户端配置。

use crate::certificate::CertificateGenerator;
use crate::client_config::VpnClientConfig;
use crate::error::VpnError;
use async_trait::async_trait;
use domain::persist::{
    exists_and_not_empty, read_json, read_text, remove_if_exists, write_atomic, write_json_atomic,
};
use domain::{CredentialResource, DeviceState, ServerResource, resource_uuid};
use edge_commission::CsrSlot;
use edge_orchestrator::{Orchestrator, VpnClientState};
use edge_remote::{RemoteClient, Resource, ResourceKind};
use edge_status::StatusSender;
use edge_telemetry::record_vpn_configured;
use edge_worker::{Worker, WorkerError};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const VPN_MODULE: &str = "vpn";
pub const VPN_ACTION: &str = "vpn";

/// 等待控制面签发凭据的上限（commission 周期 + 余量）。
pub const CREDENTIAL_TIMEOUT: Duration = Duration::from_secs(75);
pub const CREDENTIAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpnState {
    NoVpnServer,
    CertNeeded,
    AwaitingCredential,
    Configured,
}

impl VpnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VpnState::NoVpnServer => "NO_VPN_SERVER",
            VpnState::CertNeeded => "CERT_NEEDED",
            VpnState::AwaitingCredential => "AWAITING_CREDENTIAL",
            VpnState::Configured => "CONFIGURED",
        }
    }
}

/// VPN 目录下的文件。
#[derive(Debug, Clone)]
pub struct VpnPaths {
    pub key: PathBuf,
    pub csr: PathBuf,
    pub credential: PathBuf,
    pub server: PathBuf,
    /// 组装后的配置（JSON 明文记录）。
    pub plain_config: PathBuf,
    /// VPN 客户端进程读取的配置文件。
    pub client_config: PathBuf,
}

impl VpnPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            key: dir.join("nuvlaedge-vpn.key"),
            csr: dir.join("nuvlaedge-vpn.csr"),
            credential: dir.join("vpn-credential"),
            server: dir.join("vpn-server"),
            plain_config: dir.join("client_vpn_conf.json"),
            client_config: dir.join("nuvlaedge.conf"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VpnSettings {
    /// 本地开关；关闭时只上报 STOPPED。
    pub enabled: bool,
    pub interface_name: String,
    pub extra_config: Option<String>,
    pub credential_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for VpnSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interface_name: "vpn".to_string(),
            extra_config: None,
            credential_timeout: CREDENTIAL_TIMEOUT,
            poll_interval: CREDENTIAL_POLL_INTERVAL,
        }
    }
}

/// 是否需要重新生成证书并 commission。
///
/// 任一条件成立即为 true：远端还没有已签发的凭据；本地凭据与远端凭据内容不同；
/// 远端 VPN 服务端 id 与构建本地配置时使用的不同。
pub fn needs_commission(
    local_credential: Option<&CredentialResource>,
    local_server_id: Option<&str>,
    remote_credential: Option<&CredentialResource>,
    remote_server_id: &str,
) -> bool {
    let Some(remote) = remote_credential.filter(|credential| credential.is_issued()) else {
        return true;
    };
    if local_credential != Some(remote) {
        return true;
    }
    local_server_id != Some(remote_server_id)
}

pub struct VpnManager {
    client: Arc<RemoteClient>,
    orchestrator: Arc<dyn Orchestrator>,
    generator: Arc<dyn CertificateGenerator>,
    csr: CsrSlot,
    paths: VpnPaths,
    settings: VpnSettings,
    status: StatusSender,
    state: VpnState,
    credential: Option<CredentialResource>,
    server: Option<ServerResource>,
}

impl VpnManager {
    /// 从磁盘恢复上次用于构建客户端配置的凭据与服务端描述。
    pub fn new(
        client: Arc<RemoteClient>,
        orchestrator: Arc<dyn Orchestrator>,
        generator: Arc<dyn CertificateGenerator>,
        csr: CsrSlot,
        paths: VpnPaths,
        settings: VpnSettings,
        status: StatusSender,
    ) -> Self {
        let credential = load_snapshot(&paths.credential);
        let server = load_snapshot(&paths.server);
        status.starting(VPN_MODULE, "");
        Self {
            client,
            orchestrator,
            generator,
            csr,
            paths,
            settings,
            status,
            state: VpnState::CertNeeded,
            credential,
            server,
        }
    }

    pub fn state(&self) -> VpnState {
        self.state
    }

    pub fn local_credential(&self) -> Option<&CredentialResource> {
        self.credential.as_ref()
    }

    pub fn local_server_id(&self) -> Option<&str> {
        self.server.as_ref().and_then(|server| server.id.as_deref())
    }

    pub async fn run(&mut self) -> Result<(), VpnError> {
        let device = self.client.device().await?;
        let Some(server_id) = device.vpn_server_id.clone() else {
            self.state = VpnState::NoVpnServer;
            return Err(VpnError::NoVpnServer);
        };

        if !self.settings.enabled {
            debug!(target: "edge.vpn", "vpn disabled by local settings");
            self.status.stopped(VPN_MODULE, "disabled by local settings");
            return Ok(());
        }

        if self.orchestrator.vpn_client_state().await == VpnClientState::Missing {
            return Err(VpnError::ConfigurationMismatch(
                "device has a vpn server but no vpn client".to_string(),
            ));
        }
        self.status.running(VPN_MODULE, "");

        if device.state != DeviceState::Commissioned {
            debug!(target: "edge.vpn", state = device.state.as_str(), "device_not_commissioned");
            return Ok(());
        }

        let remote_credential = self.client.vpn_credential().await?;
        if !needs_commission(
            self.credential.as_ref(),
            self.local_server_id(),
            remote_credential.as_ref(),
            &server_id,
        ) {
            self.state = VpnState::Configured;
            debug!(target: "edge.vpn", "vpn_credential_aligned");
            return Ok(());
        }

        info!(
            target: "edge.vpn",
            server_id = %server_id,
            has_remote_credential = remote_credential.is_some(),
            "vpn_commission_needed"
        );
        self.state = VpnState::CertNeeded;
        let csr = self.generate_certificates().await?;
        if self.csr.offer(csr).is_some() {
            debug!(target: "edge.vpn", "previous csr replaced before commission");
        }

        self.state = VpnState::AwaitingCredential;
        self.status.starting(VPN_MODULE, "waiting for vpn credential");
        let credential = self.wait_credential(remote_credential.as_ref()).await?;

        let server = match self.client.refresh(ResourceKind::VpnServer).await? {
            Resource::VpnServer(Some(server)) => server,
            _ => return Err(VpnError::ServerUnavailable(server_id)),
        };
        self.configure(credential, server)?;
        self.state = VpnState::Configured;
        self.status.running(VPN_MODULE, "vpn client configured");
        Ok(())
    }

    /// 删除旧私钥与 CSR 后重新生成，返回 CSR 内容。
    async fn generate_certificates(&self) -> Result<String, VpnError> {
        remove_if_exists(&self.paths.key)?;
        remove_if_exists(&self.paths.csr)?;
        if let Some(dir) = self.paths.key.parent() {
            std::fs::create_dir_all(dir).map_err(|err| {
                VpnError::CertificateGeneration(format!("{}: {}", dir.display(), err))
            })?;
        }
        let common_name = resource_uuid(self.client.device_id()).to_string();
        self.generator
            .generate(&self.paths.key, &self.paths.csr, &common_name)
            .await?;

        if !exists_and_not_empty(&self.paths.key) {
            return Err(VpnError::CertificateGeneration(format!(
                "{} missing after generation",
                self.paths.key.display()
            )));
        }
        read_text(&self.paths.csr)?.ok_or_else(|| {
            VpnError::CertificateGeneration(format!(
                "{} missing after generation",
                self.paths.csr.display()
            ))
        })
    }

    /// 轮询远端直到出现与 `previous` 不同的已签发凭据。
    async fn wait_credential(
        &self,
        previous: Option<&CredentialResource>,
    ) -> Result<CredentialResource, VpnError> {
        let timeout = self.settings.credential_timeout;
        let poll = async {
            loop {
                tokio::time::sleep(self.settings.poll_interval).await;
                self.client.invalidate(ResourceKind::VpnCredential);
                match self.client.vpn_credential().await {
                    Ok(Some(credential))
                        if credential.is_issued() && previous != Some(&credential) =>
                    {
                        return credential;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        debug!(target: "edge.vpn", "credential poll failed: {}", err)
                    }
                }
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(credential) => {
                info!(
                    target: "edge.vpn",
                    credential_id = credential.id.as_deref().unwrap_or_default(),
                    "vpn_credential_created"
                );
                Ok(credential)
            }
            Err(_) => {
                warn!(target: "edge.vpn", timeout_s = timeout.as_secs(), "vpn_credential_timeout");
                Err(VpnError::CredentialCreationTimeout(timeout))
            }
        }
    }

    fn configure(
        &mut self,
        credential: CredentialResource,
        server: ServerResource,
    ) -> Result<(), VpnError> {
        let key = read_text(&self.paths.key)?.ok_or_else(|| {
            VpnError::CertificateGeneration(format!("{} missing", self.paths.key.display()))
        })?;
        let config = VpnClientConfig::assemble(
            &server,
            &credential,
            &self.settings.interface_name,
            self.settings.extra_config.as_deref().unwrap_or_default(),
        );

        write_json_atomic(&self.paths.plain_config, &config)?;
        write_atomic(&self.paths.client_config, config.render(&key).as_bytes())?;
        write_json_atomic(&self.paths.credential, &credential)?;
        write_json_atomic(&self.paths.server, &server)?;

        record_vpn_configured();
        info!(
            target: "edge.vpn",
            server_id = server.id.as_deref().unwrap_or_default(),
            endpoints = server.vpn_endpoints.len(),
            "vpn_client_configured"
        );
        self.credential = Some(credential);
        self.server = Some(server);
        Ok(())
    }
}

#[async_trait]
impl Worker for VpnManager {
    async fn perform(&mut self, action: &str) -> Result<(), WorkerError> {
        if action != VPN_ACTION {
            return Err(WorkerError::fatal(format!("vpn manager has no action {}", action)));
        }
        match self.run().await {
            Ok(()) => Ok(()),
            Err(VpnError::Remote(err)) => {
                warn!(target: "edge.vpn", "remote read failed, skip tick: {}", err);
                self.status.warning(VPN_MODULE, format!("remote unavailable: {}", err));
                Ok(())
            }
            Err(err) => {
                self.status.failing(VPN_MODULE, err.to_string());
                Err(err.into())
            }
        }
    }
}

fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match read_json(path) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(target: "edge.vpn", path = %path.display(), "vpn snapshot unreadable: {}", err);
            None
        }
    }
}
