//! 追踪初始化、请求 ID 与进程内计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub resource_fetches: u64,
    pub cache_hits: u64,
    pub commission_sent: u64,
    pub commission_failed: u64,
    pub commission_skipped: u64,
    pub worker_failures: u64,
    pub worker_restarts: u64,
    pub worker_escalations: u64,
    pub vpn_configured: u64,
    pub heartbeat_success: u64,
    pub heartbeat_failure: u64,
}

/// 进程内计数器。
pub struct TelemetryMetrics {
    resource_fetches: AtomicU64,
    cache_hits: AtomicU64,
    commission_sent: AtomicU64,
    commission_failed: AtomicU64,
    commission_skipped: AtomicU64,
    worker_failures: AtomicU64,
    worker_restarts: AtomicU64,
    worker_escalations: AtomicU64,
    vpn_configured: AtomicU64,
    heartbeat_success: AtomicU64,
    heartbeat_failure: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            resource_fetches: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            commission_sent: AtomicU64::new(0),
            commission_failed: AtomicU64::new(0),
            commission_skipped: AtomicU64::new(0),
            worker_failures: AtomicU64::new(0),
            worker_restarts: AtomicU64::new(0),
            worker_escalations: AtomicU64::new(0),
            vpn_configured: AtomicU64::new(0),
            heartbeat_success: AtomicU64::new(0),
            heartbeat_failure: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            resource_fetches: self.resource_fetches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            commission_sent: self.commission_sent.load(Ordering::Relaxed),
            commission_failed: self.commission_failed.load(Ordering::Relaxed),
            commission_skipped: self.commission_skipped.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
            worker_restarts: self.worker_restarts.load(Ordering::Relaxed),
            worker_escalations: self.worker_escalations.load(Ordering::Relaxed),
            vpn_configured: self.vpn_configured.load(Ordering::Relaxed),
            heartbeat_success: self.heartbeat_success.load(Ordering::Relaxed),
            heartbeat_failure: self.heartbeat_failure.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info，可由 RUST_LOG 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成远端调用使用的 request_id。
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录远端资源实际拉取次数。
pub fn record_resource_fetch() {
    metrics().resource_fetches.fetch_add(1, Ordering::Relaxed);
}

/// 记录缓存命中次数。
pub fn record_cache_hit() {
    metrics().cache_hits.fetch_add(1, Ordering::Relaxed);
}

pub fn record_commission_sent() {
    metrics().commission_sent.fetch_add(1, Ordering::Relaxed);
}

pub fn record_commission_failed() {
    metrics().commission_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录无差异、跳过写入的 tick 次数。
pub fn record_commission_skipped() {
    metrics()
        .commission_skipped
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_worker_failure() {
    metrics().worker_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_worker_restart() {
    metrics().worker_restarts.fetch_add(1, Ordering::Relaxed);
}

pub fn record_worker_escalation() {
    metrics()
        .worker_escalations
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录 VPN 客户端配置写入次数。
pub fn record_vpn_configured() {
    metrics().vpn_configured.fetch_add(1, Ordering::Relaxed);
}

pub fn record_heartbeat_success() {
    metrics().heartbeat_success.fetch_add(1, Ordering::Relaxed);
}

pub fn record_heartbeat_failure() {
    metrics().heartbeat_failure.fetch_add(1, Ordering::Relaxed);
}
