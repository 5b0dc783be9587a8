use api_contract::CREDENTIAL_COLLECTION;
use async_trait::async_trait;
use domain::ModuleStatus;
use edge_commission::CsrSlot;
use edge_orchestrator::{OrchestratorKind, StaticOrchestrator, VpnClientState};
use edge_remote::{ClientOptions, InMemoryApi, RemoteClient, ResourceKind};
use edge_status::StatusAggregator;
use edge_vpn::{
    CertificateGenerator, VPN_ACTION, VPN_MODULE, VpnError, VpnManager, VpnPaths, VpnSettings,
    VpnState,
};
use edge_worker::{ErrorKind, Worker};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const DEVICE_ID: &str = "nuvlabox/5e1f";
const SERVER_ID: &str = "infrastructure-service/vpn-1";

/// 写入固定内容的证书生成器，记录每次调用时旧文件是否仍在。
#[derive(Default)]
struct FakeGenerator {
    calls: Mutex<Vec<(String, bool)>>,
}

impl FakeGenerator {
    fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl CertificateGenerator for FakeGenerator {
    async fn generate(
        &self,
        key_path: &Path,
        csr_path: &Path,
        common_name: &str,
    ) -> Result<(), VpnError> {
        let stale = key_path.exists() || csr_path.exists();
        let count = {
            let mut calls = self.calls.lock().expect("calls");
            calls.push((common_name.to_string(), stale));
            calls.len()
        };
        fs::write(key_path, format!("KEY-{}", count)).expect("key");
        fs::write(csr_path, format!("CSR-{}", count)).expect("csr");
        Ok(())
    }
}

struct Harness {
    api: Arc<InMemoryApi>,
    client: Arc<RemoteClient>,
    orchestrator: Arc<StaticOrchestrator>,
    generator: Arc<FakeGenerator>,
    csr: CsrSlot,
    paths: VpnPaths,
    aggregator: StatusAggregator,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let api = Arc::new(InMemoryApi::new());
        api.put_document(
            DEVICE_ID,
            json!({"id": DEVICE_ID, "state": "COMMISSIONED", "vpn-server-id": SERVER_ID}),
        );
        api.put_document(SERVER_ID, server(SERVER_ID));
        let client = Arc::new(RemoteClient::new(
            ClientOptions {
                endpoint: "nuvla.example.com".to_string(),
                insecure: false,
                device_id: DEVICE_ID.to_string(),
                session_path: dir.path().join("session.json"),
                min_sync_interval: Duration::ZERO,
            },
            api.clone(),
        ));
        let orchestrator = Arc::new(
            StaticOrchestrator::new(OrchestratorKind::Swarm)
                .with_vpn_client(VpnClientState::Running),
        );
        let paths = VpnPaths::in_dir(&dir.path().join("vpn"));
        Self {
            api,
            client,
            orchestrator,
            generator: Arc::new(FakeGenerator::default()),
            csr: CsrSlot::new(),
            paths,
            aggregator: StatusAggregator::default(),
            _dir: dir,
        }
    }

    fn manager(&self, settings: VpnSettings) -> VpnManager {
        VpnManager::new(
            self.client.clone(),
            self.orchestrator.clone(),
            self.generator.clone(),
            self.csr.clone(),
            self.paths.clone(),
            settings,
            self.aggregator.sender(),
        )
    }

    /// 模拟控制面：取走 CSR 后签发凭据。
    fn issue_on_csr(&self, certificate: &'static str) -> JoinHandle<String> {
        let api = self.api.clone();
        let csr = self.csr.clone();
        tokio::spawn(async move {
            loop {
                if let Some(request) = csr.take() {
                    api.set_collection(CREDENTIAL_COLLECTION, vec![credential(certificate)]);
                    return request;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
    }

    fn module_status(&mut self) -> Option<ModuleStatus> {
        self.aggregator.update_status();
        self.aggregator
            .module(VPN_MODULE)
            .map(|report| report.module_status)
    }
}

fn server(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "vpn-ca-certificate": "CA-PEM",
        "vpn-intermediate-ca": ["IS-CA"],
        "vpn-shared-key": "SHARED",
        "vpn-common-name-prefix": "nuvlabox-",
        "vpn-endpoints": [
            {"endpoint": "vpn.example.com", "port": 1194, "protocol": "udp"},
        ],
    })
}

fn credential(certificate: &str) -> serde_json::Value {
    json!({
        "id": "credential/vpn-5e1f",
        "parent": DEVICE_ID,
        "method": "create-credential-vpn-nuvlabox",
        "vpn-certificate": certificate,
        "vpn-intermediate-ca": ["CRED-CA"],
    })
}

#[tokio::test(start_paused = true)]
async fn first_run_requests_credential_and_writes_client_config() {
    let harness = Harness::new();
    let control_plane = harness.issue_on_csr("CERT-1");
    let mut manager = harness.manager(VpnSettings::default());

    manager.run().await.expect("run");

    assert_eq!(control_plane.await.expect("join"), "CSR-1");
    assert_eq!(manager.state(), VpnState::Configured);
    assert_eq!(harness.generator.calls(), vec![("5e1f".to_string(), false)]);

    let rendered = fs::read_to_string(&harness.paths.client_config).expect("client config");
    assert!(rendered.contains("<cert>\nCERT-1\n</cert>"));
    assert!(rendered.contains("<key>\nKEY-1\n</key>"));
    assert!(rendered.contains("remote vpn.example.com 1194 udp"));
    let plain = fs::read_to_string(&harness.paths.plain_config).expect("plain config");
    assert!(!plain.contains("KEY-1"));
    assert_eq!(manager.local_server_id(), Some(SERVER_ID));
    assert!(harness.paths.credential.exists());
}

#[tokio::test(start_paused = true)]
async fn aligned_credential_does_no_certificate_work() {
    let harness = Harness::new();
    harness.issue_on_csr("CERT-1");
    let mut manager = harness.manager(VpnSettings::default());
    manager.run().await.expect("configure");

    manager.run().await.expect("second run");
    assert_eq!(harness.generator.calls().len(), 1);
    assert!(harness.csr.is_empty());

    // 重启后从磁盘恢复，同样不需要重新签发
    let mut restarted = harness.manager(VpnSettings::default());
    assert!(restarted.local_credential().is_some());
    restarted.run().await.expect("after restart");
    assert_eq!(restarted.state(), VpnState::Configured);
    assert_eq!(harness.generator.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn changed_server_id_triggers_recommission() {
    let harness = Harness::new();
    harness.issue_on_csr("CERT-1");
    let mut manager = harness.manager(VpnSettings::default());
    manager.run().await.expect("configure");

    let new_server = "infrastructure-service/vpn-2";
    harness.api.put_document(new_server, server(new_server));
    harness.api.put_document(
        DEVICE_ID,
        json!({"id": DEVICE_ID, "state": "COMMISSIONED", "vpn-server-id": new_server}),
    );
    harness.client.invalidate(ResourceKind::Device);
    harness.issue_on_csr("CERT-2");

    manager.run().await.expect("recommission");
    assert_eq!(manager.local_server_id(), Some(new_server));
    let calls = harness.generator.calls();
    assert_eq!(calls.len(), 2);
    // 旧私钥与 CSR 在重新生成前已删除
    assert!(!calls[1].1);
    let rendered = fs::read_to_string(&harness.paths.client_config).expect("client config");
    assert!(rendered.contains("CERT-2"));
}

#[tokio::test(start_paused = true)]
async fn stale_remote_credential_is_not_accepted() {
    let harness = Harness::new();
    harness
        .api
        .set_collection(CREDENTIAL_COLLECTION, vec![credential("CERT-OLD")]);
    harness.issue_on_csr("CERT-NEW");
    let mut manager = harness.manager(VpnSettings::default());

    manager.run().await.expect("run");
    assert_eq!(
        manager
            .local_credential()
            .and_then(|credential| credential.vpn_certificate.as_deref()),
        Some("CERT-NEW")
    );
}

#[tokio::test(start_paused = true)]
async fn credential_timeout_ends_tick_for_retry() {
    let mut harness = Harness::new();
    let settings = VpnSettings {
        credential_timeout: Duration::from_secs(5),
        ..VpnSettings::default()
    };
    let mut manager = harness.manager(settings);

    let err = manager.perform(VPN_ACTION).await.expect_err("timeout");
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(manager.state(), VpnState::AwaitingCredential);
    assert!(!harness.csr.is_empty());
    assert!(!harness.paths.client_config.exists());
    assert_eq!(harness.module_status(), Some(ModuleStatus::Failing));
}

#[tokio::test(start_paused = true)]
async fn missing_vpn_client_is_fatal() {
    let mut harness = Harness::new();
    harness.orchestrator.set_vpn_client(VpnClientState::Missing);
    let mut manager = harness.manager(VpnSettings::default());

    let err = manager.perform(VPN_ACTION).await.expect_err("mismatch");
    assert_eq!(err.kind, ErrorKind::Fatal);
    assert!(harness.generator.calls().is_empty());
    assert_eq!(harness.module_status(), Some(ModuleStatus::Failing));
}

#[tokio::test(start_paused = true)]
async fn device_without_vpn_server_is_fatal() {
    let harness = Harness::new();
    harness
        .api
        .put_document(DEVICE_ID, json!({"id": DEVICE_ID, "state": "COMMISSIONED"}));
    let mut manager = harness.manager(VpnSettings::default());

    let err = manager.perform(VPN_ACTION).await.expect_err("no server");
    assert_eq!(err.kind, ErrorKind::Fatal);
    assert_eq!(manager.state(), VpnState::NoVpnServer);
}

#[tokio::test(start_paused = true)]
async fn disabled_vpn_reports_stopped() {
    let mut harness = Harness::new();
    let settings = VpnSettings {
        enabled: false,
        ..VpnSettings::default()
    };
    let mut manager = harness.manager(settings);

    manager.perform(VPN_ACTION).await.expect("disabled");
    assert!(harness.generator.calls().is_empty());
    assert_eq!(harness.module_status(), Some(ModuleStatus::Stopped));
}
