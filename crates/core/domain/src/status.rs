//! 模块状态上报与设备级状态。

use serde::{Deserialize, Serialize};

/// 单个模块（worker）的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    Starting,
    Running,
    Stopped,
    Warning,
    Failing,
    Failed,
    Unknown,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Starting => "STARTING",
            ModuleStatus::Running => "RUNNING",
            ModuleStatus::Stopped => "STOPPED",
            ModuleStatus::Warning => "WARNING",
            ModuleStatus::Failing => "FAILING",
            ModuleStatus::Failed => "FAILED",
            ModuleStatus::Unknown => "UNKNOWN",
        }
    }
}

/// 聚合后的设备级状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Operational,
    Degraded,
    #[default]
    Unknown,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Operational => "OPERATIONAL",
            DeviceStatus::Degraded => "DEGRADED",
            DeviceStatus::Unknown => "UNKNOWN",
        }
    }
}

/// 模块状态上报。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub origin_module: String,
    pub module_status: ModuleStatus,
    pub ts_ms: i64,
    pub message: String,
}

impl StatusReport {
    pub fn new(
        origin_module: impl Into<String>,
        module_status: ModuleStatus,
        message: impl Into<String>,
        ts_ms: i64,
    ) -> Self {
        Self {
            origin_module: origin_module.into(),
            module_status,
            ts_ms,
            message: message.into(),
        }
    }
}
