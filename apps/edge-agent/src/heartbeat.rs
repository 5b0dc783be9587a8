//! 心跳：设备 COMMISSIONED 之后周期调用 heartbeat 操作。
//!
//! 周期跟随设备记录的 `heartbeat-interval`；响应中的 `doc-last-updated`
//! 变化时强制重新读取设备记录。

use api_contract::OperationResponse;
use async_trait::async_trait;
use domain::{DeviceRecord, DeviceState};
use edge_remote::{RemoteClient, ResourceKind};
use edge_status::StatusSender;
use edge_telemetry::{record_heartbeat_failure, record_heartbeat_success};
use edge_worker::{Worker, WorkerError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const HEARTBEAT_MODULE: &str = "heartbeat";
pub const HEARTBEAT_ACTION: &str = "heartbeat";

pub struct HeartbeatWorker {
    client: Arc<RemoteClient>,
    status: StatusSender,
    period: Option<Duration>,
    last_update: Option<String>,
}

impl HeartbeatWorker {
    pub fn new(client: Arc<RemoteClient>, status: StatusSender) -> Self {
        Self {
            client,
            status,
            period: None,
            last_update: None,
        }
    }

    fn follow_device(&mut self, device: &DeviceRecord) {
        self.period = device
            .heartbeat_interval
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs);
    }

    /// 记录 `doc-last-updated`；与上次不同时返回 true。
    fn device_changed(&mut self, last_update: Option<String>) -> bool {
        match last_update {
            Some(value) if !value.is_empty() && self.last_update.as_ref() != Some(&value) => {
                self.last_update = Some(value);
                true
            }
            _ => false,
        }
    }

    async fn handle_response(&mut self, response: Value) {
        let response: OperationResponse = match serde_json::from_value(response) {
            Ok(response) => response,
            Err(err) => {
                debug!(target: "edge.agent", "heartbeat response not decoded: {}", err);
                OperationResponse::default()
            }
        };
        info!(target: "edge.agent", jobs = response.jobs.len(), "heartbeat_sent");

        if self.device_changed(response.doc_last_updated) {
            info!(target: "edge.agent", "device_record_changed");
            self.client.invalidate(ResourceKind::Device);
            match self.client.device().await {
                Ok(device) => self.follow_device(&device),
                Err(err) => warn!(target: "edge.agent", "device refresh failed: {}", err),
            }
        }
    }
}

#[async_trait]
impl Worker for HeartbeatWorker {
    async fn perform(&mut self, action: &str) -> Result<(), WorkerError> {
        if action != HEARTBEAT_ACTION {
            return Err(WorkerError::fatal(format!("heartbeat has no action {}", action)));
        }
        let state = match self.client.device().await {
            Ok(device) => {
                self.follow_device(&device);
                device.state
            }
            Err(err) => {
                warn!(target: "edge.agent", "device read failed before heartbeat: {}", err);
                self.status
                    .warning(HEARTBEAT_MODULE, format!("remote unavailable: {}", err));
                return Ok(());
            }
        };
        // commission 完成之前远端不接受心跳
        if state != DeviceState::Commissioned {
            debug!(target: "edge.agent", state = state.as_str(), "heartbeat_skipped");
            return Ok(());
        }

        match self.client.heartbeat().await {
            Some(response) => {
                record_heartbeat_success();
                self.handle_response(response).await;
                self.status.running(HEARTBEAT_MODULE, "");
            }
            None => {
                record_heartbeat_failure();
                self.status
                    .failing(HEARTBEAT_MODULE, "heartbeat failed, retry next period");
            }
        }
        Ok(())
    }

    fn period(&self) -> Option<Duration> {
        self.period
    }
}
