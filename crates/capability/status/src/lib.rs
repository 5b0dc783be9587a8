//! 状态聚合：收集各模块的状态上报，折叠成一个设备级状态。
//!
//! 模块通过 [`StatusSender`] 写入无界通道；只有 [`StatusAggregator::update_status`]
//! 会消费通道并重新计算，因此上报与计算在这里串行化。

use domain::{DeviceStatus, ModuleStatus, StatusReport, now_epoch_ms};
use edge_orchestrator::Orchestrator;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

/// 模块状态的默认过期窗口。
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// 编排引擎自检问题使用的模块名。
pub const COE_MODULE: &str = "COE";

/// 状态上报通道的写端，可在 worker 之间克隆。
#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: UnboundedSender<StatusReport>,
}

impl StatusSender {
    pub fn send(&self, report: StatusReport) {
        if self.tx.send(report).is_err() {
            debug!(target: "edge.status", "status channel closed, report dropped");
        }
    }

    pub fn report(&self, module: &str, status: ModuleStatus, message: impl Into<String>) {
        self.send(StatusReport::new(module, status, message, now_epoch_ms()));
    }

    pub fn starting(&self, module: &str, message: impl Into<String>) {
        self.report(module, ModuleStatus::Starting, message);
    }

    pub fn running(&self, module: &str, message: impl Into<String>) {
        self.report(module, ModuleStatus::Running, message);
    }

    pub fn stopped(&self, module: &str, message: impl Into<String>) {
        self.report(module, ModuleStatus::Stopped, message);
    }

    pub fn failing(&self, module: &str, message: impl Into<String>) {
        self.report(module, ModuleStatus::Failing, message);
    }

    pub fn failed(&self, module: &str, message: impl Into<String>) {
        self.report(module, ModuleStatus::Failed, message);
    }

    pub fn warning(&self, module: &str, message: impl Into<String>) {
        self.report(module, ModuleStatus::Warning, message);
    }
}

pub struct StatusAggregator {
    tx: UnboundedSender<StatusReport>,
    rx: UnboundedReceiver<StatusReport>,
    timeout: Duration,
    modules: BTreeMap<String, StatusReport>,
    status: DeviceStatus,
    notes: Vec<String>,
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new(STATUS_TIMEOUT)
    }
}

impl StatusAggregator {
    pub fn new(timeout: Duration) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            tx,
            rx,
            timeout,
            modules: BTreeMap::new(),
            status: DeviceStatus::Unknown,
            notes: Vec::new(),
        }
    }

    pub fn sender(&self) -> StatusSender {
        StatusSender {
            tx: self.tx.clone(),
        }
    }

    /// 按模块名覆盖上报（最后一次上报生效）。
    pub fn add_module(&mut self, report: StatusReport) {
        self.modules.insert(report.origin_module.clone(), report);
    }

    pub fn remove_module(&mut self, module: &str) {
        self.modules.remove(module);
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn module(&self, module: &str) -> Option<&StatusReport> {
        self.modules.get(module)
    }

    pub fn process_status(&mut self) -> DeviceStatus {
        self.process_status_at(now_epoch_ms())
    }

    /// 先剔除过期上报，再折叠剩余模块状态。
    ///
    /// FAILING / FAILED 使结果为 DEGRADED，且同一轮中不会被其它模块覆盖；
    /// 否则出现 STARTING / RUNNING / STOPPED 即为 OPERATIONAL；没有模块时为 UNKNOWN。
    pub fn process_status_at(&mut self, now_ms: i64) -> DeviceStatus {
        let timeout_ms = self.timeout.as_millis() as i64;
        let expired: Vec<String> = self
            .modules
            .iter()
            .filter(|(_, report)| age_ms(report, now_ms) > timeout_ms)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            debug!(target: "edge.status", module = %name, "module_report_expired");
            self.modules.remove(name);
        }

        let mut status = DeviceStatus::Unknown;
        let mut notes = Vec::with_capacity(self.modules.len());
        for (name, report) in &self.modules {
            match report.module_status {
                ModuleStatus::Failing | ModuleStatus::Failed => status = DeviceStatus::Degraded,
                ModuleStatus::Starting | ModuleStatus::Running | ModuleStatus::Stopped
                    if status != DeviceStatus::Degraded =>
                {
                    status = DeviceStatus::Operational
                }
                _ => {}
            }
            notes.push(note_line(name, report, now_ms));
        }
        self.status = status;
        self.notes = notes;
        status
    }

    /// 消费通道中所有待处理上报（非阻塞），然后重新计算。
    pub fn update_status(&mut self) -> DeviceStatus {
        while let Ok(report) = self.rx.try_recv() {
            self.add_module(report);
        }
        debug!(target: "edge.status", modules = self.modules.len(), "status_reports_consumed");
        self.process_status()
    }

    /// 追加编排引擎自检结果后返回设备级状态与说明。
    pub async fn get_status(
        &mut self,
        orchestrator: &dyn Orchestrator,
    ) -> (DeviceStatus, Vec<String>) {
        let issues = orchestrator.system_issues().await;
        if !issues.is_empty() {
            let message = issues.join("\n");
            warn!(target: "edge.status", issues = %message, "coe_reports_issues");
            self.sender().failing(COE_MODULE, message);
        }
        let status = self.update_status();
        (status, self.notes.clone())
    }
}

fn age_ms(report: &StatusReport, now_ms: i64) -> i64 {
    (now_ms - report.ts_ms).max(0)
}

fn note_line(name: &str, report: &StatusReport, now_ms: i64) -> String {
    let message = if report.message.is_empty() {
        String::new()
    } else {
        format!(" - {}", report.message)
    };
    format!(
        "{:<16} - {:<6}s: {:<9}{}",
        name,
        age_ms(report, now_ms) / 1000,
        report.module_status.as_str(),
        message
    )
}
