//! 静态 worker 注册表：名称 → 构造函数，启动时按名称创建监督器。

use crate::heartbeat::{HEARTBEAT_ACTION, HeartbeatWorker};
use edge_commission::{COMMISSION_ACTION, CommissionPaths, Commissioner, CsrSlot};
use edge_config::AgentConfig;
use edge_orchestrator::Orchestrator;
use edge_remote::RemoteClient;
use edge_status::StatusSender;
use edge_vpn::{CertificateGenerator, VPN_ACTION, VpnManager, VpnPaths, VpnSettings};
use edge_worker::{Supervisor, SupervisorConfig, Worker, WorkerFactory};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const COMMISSIONER: &str = "commissioner";
pub const VPN: &str = "vpn";
pub const HEARTBEAT: &str = "heartbeat";

/// 构造 worker 所需的共享依赖。
#[derive(Clone)]
pub struct WorkerContext {
    pub config: AgentConfig,
    pub client: Arc<RemoteClient>,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub generator: Arc<dyn CertificateGenerator>,
    pub csr: CsrSlot,
    pub status: StatusSender,
    /// 启动时设备记录是否带有 VPN 服务端 id。
    pub has_vpn_server: bool,
    /// 启动时设备记录给出的心跳周期。
    pub heartbeat_interval: Option<Duration>,
}

/// 返回 `None` 表示该 worker 在当前设备上不启用。
pub type Constructor = fn(&WorkerContext) -> Option<Supervisor>;

pub fn registry() -> BTreeMap<&'static str, Constructor> {
    let mut workers: BTreeMap<&'static str, Constructor> = BTreeMap::new();
    workers.insert(COMMISSIONER, commissioner);
    workers.insert(VPN, vpn);
    workers.insert(HEARTBEAT, heartbeat);
    workers
}

fn commissioner(context: &WorkerContext) -> Option<Supervisor> {
    let paths = context.config.paths();
    let commission_paths = CommissionPaths {
        commissioned_data: paths.commissioned_data,
        tls_ca: paths.tls_ca,
        tls_cert: paths.tls_cert,
        tls_key: paths.tls_key,
        vpn_ip: paths.vpn_ip,
    };
    let period = Duration::from_secs(context.config.commission_period_seconds);
    let context = context.clone();
    let factory: WorkerFactory = Arc::new(move || {
        Ok(Box::new(Commissioner::new(
            context.client.clone(),
            context.orchestrator.clone(),
            context.csr.clone(),
            commission_paths.clone(),
            context.status.clone(),
        )) as Box<dyn Worker>)
    });
    Some(Supervisor::new(
        SupervisorConfig::new(COMMISSIONER, period, &[COMMISSION_ACTION]),
        factory,
    ))
}

fn vpn(context: &WorkerContext) -> Option<Supervisor> {
    if !context.has_vpn_server {
        return None;
    }
    let config = &context.config;
    let period = Duration::from_secs(config.vpn_period_seconds);
    let paths = VpnPaths::in_dir(&config.paths().vpn_dir);
    let settings = VpnSettings {
        enabled: config.vpn_enabled,
        interface_name: config.vpn_interface_name.clone(),
        extra_config: config.vpn_extra_config.clone(),
        credential_timeout: config.vpn_credential_timeout(),
        ..VpnSettings::default()
    };
    let context = context.clone();
    let factory: WorkerFactory = Arc::new(move || {
        Ok(Box::new(VpnManager::new(
            context.client.clone(),
            context.orchestrator.clone(),
            context.generator.clone(),
            context.csr.clone(),
            paths.clone(),
            settings.clone(),
            context.status.clone(),
        )) as Box<dyn Worker>)
    });
    // 先让 commissioner 跑完第一轮
    Some(Supervisor::new(
        SupervisorConfig::new(VPN, period, &[VPN_ACTION]).with_initial_delay(Duration::from_secs(5)),
        factory,
    ))
}

/// 优先使用设备记录的周期，之后由 worker 随设备记录调整。
fn heartbeat(context: &WorkerContext) -> Option<Supervisor> {
    let period = context
        .heartbeat_interval
        .unwrap_or_else(|| Duration::from_secs(context.config.heartbeat_period_seconds));
    let client = context.client.clone();
    let status = context.status.clone();
    let factory: WorkerFactory = Arc::new(move || {
        Ok(Box::new(HeartbeatWorker::new(client.clone(), status.clone())) as Box<dyn Worker>)
    });
    Some(Supervisor::new(
        SupervisorConfig::new(HEARTBEAT, period, &[HEARTBEAT_ACTION]).with_initial_delay(period),
        factory,
    ))
}
