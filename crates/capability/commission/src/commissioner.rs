//! 每轮流程：计算期望状态 → 与上次提交比较 → 有变化才提交 → 成功后持久化。

use crate::csr::CsrSlot;
use crate::diff::diff_payload;
use crate::error::CommissionError;
use async_trait::async_trait;
use domain::attributes::{SWARM_TOKEN_MANAGER, SWARM_TOKEN_WORKER};
use domain::persist::{exists_and_not_empty, read_json, read_text, write_json_atomic};
use domain::{CommissioningAttributes, resource_uuid};
use edge_orchestrator::{ApiAddress, LOCAL_ENDPOINT, Orchestrator, OrchestratorKind, TlsMaterial};
use edge_remote::RemoteClient;
use edge_status::StatusSender;
use edge_telemetry::{record_commission_failed, record_commission_sent, record_commission_skipped};
use edge_worker::{Worker, WorkerError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const COMMISSIONER_MODULE: &str = "commissioner";
pub const COMMISSION_ACTION: &str = "commission";

const HEARTBEAT_CAPABILITY: &str = "NUVLA_HEARTBEAT";
const JOB_PULL_CAPABILITY: &str = "NUVLA_JOB_PULL";

/// 协调器读写的本地文件。
#[derive(Debug, Clone)]
pub struct CommissionPaths {
    /// 上次成功提交的快照。
    pub commissioned_data: PathBuf,
    pub tls_ca: PathBuf,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    /// VPN 客户端写入的隧道 IP。
    pub vpn_ip: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommissionOutcome {
    /// 期望状态没有变化，未访问远端。
    Skipped,
    Committed { fields: usize },
    /// 远端拒绝或不可达；快照不变，下一轮重试同样的内容。
    Rejected,
}

pub struct Commissioner {
    client: Arc<RemoteClient>,
    orchestrator: Arc<dyn Orchestrator>,
    csr: CsrSlot,
    paths: CommissionPaths,
    status: StatusSender,
    last: CommissioningAttributes,
    pending_csr: Option<String>,
}

impl Commissioner {
    /// 构造时从磁盘恢复上次提交的快照；文件缺失或损坏按首次运行处理。
    pub fn new(
        client: Arc<RemoteClient>,
        orchestrator: Arc<dyn Orchestrator>,
        csr: CsrSlot,
        paths: CommissionPaths,
        status: StatusSender,
    ) -> Self {
        let last = load_last(&paths.commissioned_data);
        Self {
            client,
            orchestrator,
            csr,
            paths,
            status,
            last,
            pending_csr: None,
        }
    }

    /// 上次成功提交的内容（不含一次性字段）。
    pub fn last_payload(&self) -> &CommissioningAttributes {
        &self.last
    }

    pub fn has_pending_csr(&self) -> bool {
        self.pending_csr.is_some()
    }

    pub async fn tick(&mut self) -> Result<CommissionOutcome, CommissionError> {
        let current = self.compute_current().await?;
        let payload = diff_payload(&self.last, &current);
        if payload.is_empty() {
            record_commission_skipped();
            debug!(target: "edge.commission", "commission_up_to_date");
            return Ok(CommissionOutcome::Skipped);
        }

        let fields = payload.len();
        let Some(_) = self.client.commission(payload).await else {
            record_commission_failed();
            return Ok(CommissionOutcome::Rejected);
        };
        // 控制面已接受 CSR，即使下面落盘失败也不能重发
        self.pending_csr = None;

        let snapshot = current.without_transient();
        write_json_atomic(&self.paths.commissioned_data, &snapshot)?;
        self.last = snapshot;
        record_commission_sent();
        info!(
            target: "edge.commission",
            device_id = %self.client.device_id(),
            fields,
            "commission_sent"
        );
        Ok(CommissionOutcome::Committed { fields })
    }

    async fn compute_current(&mut self) -> Result<CommissioningAttributes, CommissionError> {
        let mut current = CommissioningAttributes::new();

        // 状态记录有 node-id 之前不声明集群归属
        let status = self.client.device_status().await?;
        if status.node_id.is_some() {
            let default_name = format!("cluster_{}", resource_uuid(self.client.device_id()));
            current.merge(self.orchestrator.cluster_info(&default_name).await?);
        }

        let mut capabilities = vec![HEARTBEAT_CAPABILITY.to_string()];
        if self.orchestrator.has_pull_job_capability() {
            capabilities.push(JOB_PULL_CAPABILITY.to_string());
        }
        current.set_capabilities(capabilities);

        let vpn_ip = read_text(&self.paths.vpn_ip)?.map(|ip| ip.trim().to_string());
        let address = self.orchestrator.api_address().await;
        let endpoint = build_endpoint(vpn_ip.as_deref(), &address);
        let tls = self.read_tls()?;
        current.merge(self.orchestrator.infra_service(&endpoint, tls.as_ref()));

        if self.orchestrator.kind() == OrchestratorKind::Swarm {
            if let Some(tokens) = self.orchestrator.join_tokens().await {
                current.set(SWARM_TOKEN_MANAGER, Value::String(tokens.manager));
                current.set(SWARM_TOKEN_WORKER, Value::String(tokens.worker));
            }
        }

        if let Some(csr) = self.csr.take() {
            debug!(target: "edge.commission", "vpn_csr_received");
            self.pending_csr = Some(csr);
        }
        if let Some(csr) = &self.pending_csr {
            current.set_vpn_csr(csr.clone());
        }
        Ok(current)
    }

    fn read_tls(&self) -> Result<Option<TlsMaterial>, CommissionError> {
        let files = [&self.paths.tls_ca, &self.paths.tls_cert, &self.paths.tls_key];
        if !files.iter().all(|path| exists_and_not_empty(path)) {
            return Ok(None);
        }
        let (Some(ca), Some(cert), Some(key)) = (
            read_text(&self.paths.tls_ca)?,
            read_text(&self.paths.tls_cert)?,
            read_text(&self.paths.tls_key)?,
        ) else {
            return Ok(None);
        };
        Ok(Some(TlsMaterial { ca, cert, key }))
    }
}

#[async_trait]
impl Worker for Commissioner {
    async fn perform(&mut self, action: &str) -> Result<(), WorkerError> {
        if action != COMMISSION_ACTION {
            return Err(WorkerError::fatal(format!(
                "commissioner has no action {}",
                action
            )));
        }
        match self.tick().await {
            Ok(CommissionOutcome::Skipped) => {
                self.status.running(COMMISSIONER_MODULE, "");
                Ok(())
            }
            Ok(CommissionOutcome::Committed { fields }) => {
                self.status
                    .running(COMMISSIONER_MODULE, format!("commissioned {} fields", fields));
                Ok(())
            }
            Ok(CommissionOutcome::Rejected) => {
                self.status
                    .warning(COMMISSIONER_MODULE, "commission failed, retry next period");
                Ok(())
            }
            Err(CommissionError::Remote(err)) => {
                warn!(target: "edge.commission", "remote read failed, skip tick: {}", err);
                self.status
                    .warning(COMMISSIONER_MODULE, format!("remote unavailable: {}", err));
                Ok(())
            }
            Err(err) => {
                self.status.failing(COMMISSIONER_MODULE, err.to_string());
                Err(err.into())
            }
        }
    }
}

/// 基础设施服务 endpoint：优先 VPN IP，其次编排引擎 API 主机，否则为 `local`。
pub fn build_endpoint(vpn_ip: Option<&str>, address: &ApiAddress) -> String {
    let Some(port) = address.port else {
        return LOCAL_ENDPOINT.to_string();
    };
    match (vpn_ip.filter(|ip| !ip.is_empty()), address.host.as_deref()) {
        (Some(ip), _) => format!("https://{}:{}", ip, port),
        (None, Some(host)) if !host.is_empty() => format!("https://{}:{}", host, port),
        _ => LOCAL_ENDPOINT.to_string(),
    }
}

fn load_last(path: &Path) -> CommissioningAttributes {
    match read_json(path) {
        Ok(Some(last)) => last,
        Ok(None) => {
            info!(target: "edge.commission", path = %path.display(), "no_previous_commission");
            CommissioningAttributes::new()
        }
        Err(err) => {
            warn!(
                target: "edge.commission",
                path = %path.display(),
                "previous commission unreadable, starting over: {}",
                err
            );
            CommissioningAttributes::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(host: Option<&str>, port: Option<u16>) -> ApiAddress {
        ApiAddress {
            host: host.map(str::to_string),
            port,
        }
    }

    #[test]
    fn endpoint_prefers_vpn_ip() {
        let address = address(Some("192.168.1.4"), Some(2376));
        assert_eq!(build_endpoint(Some("10.8.0.3"), &address), "https://10.8.0.3:2376");
        assert_eq!(build_endpoint(None, &address), "https://192.168.1.4:2376");
        assert_eq!(build_endpoint(Some(""), &address), "https://192.168.1.4:2376");
    }

    #[test]
    fn endpoint_without_port_or_host_is_local() {
        assert_eq!(build_endpoint(Some("10.8.0.3"), &address(None, None)), "local");
        assert_eq!(build_endpoint(None, &address(None, Some(2376))), "local");
    }
}
