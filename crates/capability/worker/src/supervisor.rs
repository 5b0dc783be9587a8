//! 周期 worker 监督器。
//!
//! 每个监督器拥有一个 tokio 任务：按周期依次调用 worker 声明的动作，
//! 同一个 worker 的两轮之间不会重叠。

use crate::error::{ErrorKind, SupervisorError, WorkerError};
use async_trait::async_trait;
use edge_telemetry::{record_worker_escalation, record_worker_failure, record_worker_restart};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 普通失败的上限；超过即升级。
pub const MAX_ERRORS: usize = 10;

/// 被监督的 worker。
#[async_trait]
pub trait Worker: Send {
    /// 执行一个声明过的动作。
    async fn perform(&mut self, action: &str) -> Result<(), WorkerError>;

    /// 希望采用的周期（例如由远端设备记录下发）。`None` 沿用当前周期。
    fn period(&self) -> Option<Duration> {
        None
    }
}

/// 构造（及重建）worker。
pub type WorkerFactory = Arc<dyn Fn() -> Result<Box<dyn Worker>, WorkerError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub name: String,
    pub period: Duration,
    /// 首轮之前的等待，不超过一个周期。
    pub initial_delay: Duration,
    pub actions: Vec<String>,
}

impl SupervisorConfig {
    pub fn new(name: impl Into<String>, period: Duration, actions: &[&str]) -> Self {
        Self {
            name: name.into(),
            period,
            initial_delay: Duration::ZERO,
            actions: actions.iter().map(|action| action.to_string()).collect(),
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }
}

struct Counters {
    errors: AtomicU64,
    restarts: AtomicU64,
    ticks: AtomicU64,
    period_ms: AtomicU64,
}

impl Counters {
    fn new(period: Duration) -> Self {
        Self {
            errors: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            period_ms: AtomicU64::new(period.as_millis() as u64),
        }
    }

    fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.load(Ordering::Relaxed))
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    factory: WorkerFactory,
    counters: Arc<Counters>,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, factory: WorkerFactory) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            counters: Arc::new(Counters::new(config.period)),
            config,
            factory,
            stop_tx,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// 当前周期；worker 可在运行中调整。
    pub fn period(&self) -> Duration {
        self.counters.period()
    }

    /// 已记录的普通失败次数。
    pub fn error_count(&self) -> u64 {
        self.counters.errors.load(Ordering::Relaxed)
    }

    pub fn restarts(&self) -> u64 {
        self.counters.restarts.load(Ordering::Relaxed)
    }

    pub fn ticks(&self) -> u64 {
        self.counters.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 启动监督任务。升级时错误写入 `escalations` 并结束任务。
    pub fn start(
        &mut self,
        escalations: mpsc::UnboundedSender<SupervisorError>,
    ) -> Result<(), SupervisorError> {
        if self.is_running() {
            return Err(SupervisorError::AlreadyStarted(self.config.name.clone()));
        }
        self.stop_tx.send_replace(false);
        let run = SupervisorLoop {
            config: self.config.clone(),
            factory: self.factory.clone(),
            counters: self.counters.clone(),
            stop_rx: self.stop_tx.subscribe(),
            errors: Vec::new(),
        };
        self.handle = Some(tokio::spawn(async move {
            if let Err(err) = run.run().await {
                let _ = escalations.send(err);
            }
        }));
        info!(
            target: "edge.worker",
            worker = %self.config.name,
            period_s = self.config.period.as_secs(),
            "worker_started"
        );
        Ok(())
    }

    /// 通知循环结束，并最多等待一个周期让当前这一轮完成。
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        self.stop_tx.send_replace(true);
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        info!(
            target: "edge.worker",
            worker = %self.config.name,
            wait_s = self.period().as_secs(),
            "worker_stopping"
        );
        match tokio::time::timeout(self.period(), &mut handle).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!(target: "edge.worker", worker = %self.config.name, "worker_stop_timeout");
                self.handle = Some(handle);
                Err(SupervisorError::StopTimeout(self.config.name.clone()))
            }
        }
    }
}

struct SupervisorLoop {
    config: SupervisorConfig,
    factory: WorkerFactory,
    counters: Arc<Counters>,
    stop_rx: watch::Receiver<bool>,
    errors: Vec<WorkerError>,
}

impl SupervisorLoop {
    async fn run(mut self) -> Result<(), SupervisorError> {
        let mut worker = match (self.factory)() {
            Ok(worker) => Some(worker),
            Err(err) => {
                self.process_error(err)?;
                None
            }
        };
        let mut wait = self.config.initial_delay.min(self.config.period);

        loop {
            if self.wait_or_stop(wait).await {
                debug!(target: "edge.worker", worker = %self.config.name, "worker_loop_stopped");
                return Ok(());
            }
            let started = Instant::now();
            self.counters.ticks.fetch_add(1, Ordering::Relaxed);

            if worker.is_none() {
                worker = self.recreate()?;
            }
            if let Some(current) = worker.as_mut() {
                if let Err(err) = self.tick(current.as_mut()).await {
                    let restart = err.kind == ErrorKind::Transient;
                    self.process_error(err)?;
                    if restart {
                        worker = self.recreate()?;
                    }
                }
            }

            let elapsed = started.elapsed();
            debug!(
                target: "edge.worker",
                worker = %self.config.name,
                elapsed_ms = elapsed.as_millis() as u64,
                "worker_tick_done"
            );
            if let Some(requested) = worker.as_ref().and_then(|current| current.period()) {
                self.adjust_period(requested);
            }
            wait = self.counters.period().saturating_sub(elapsed);
        }
    }

    fn adjust_period(&self, requested: Duration) {
        let current = self.counters.period();
        if requested.is_zero() || requested == current {
            return;
        }
        info!(
            target: "edge.worker",
            worker = %self.config.name,
            from_s = current.as_secs(),
            to_s = requested.as_secs(),
            "worker_period_changed"
        );
        self.counters
            .period_ms
            .store(requested.as_millis() as u64, Ordering::Relaxed);
    }

    /// 返回 true 表示收到停止信号。
    async fn wait_or_stop(&mut self, wait: Duration) -> bool {
        if *self.stop_rx.borrow() {
            return true;
        }
        let closed = tokio::select! {
            _ = tokio::time::sleep(wait) => false,
            changed = self.stop_rx.changed() => changed.is_err(),
        };
        closed || *self.stop_rx.borrow()
    }

    async fn tick(&self, worker: &mut dyn Worker) -> Result<(), WorkerError> {
        for action in &self.config.actions {
            if let Err(err) = worker.perform(action).await {
                match err.kind {
                    ErrorKind::Timeout => warn!(
                        target: "edge.worker",
                        worker = %self.config.name,
                        action = %action,
                        "action timed out, retry next period: {}",
                        err.message
                    ),
                    _ => error!(
                        target: "edge.worker",
                        worker = %self.config.name,
                        action = %action,
                        kind = %err.kind,
                        "action failed: {}",
                        err.message
                    ),
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// 按错误分类决定是否升级。超时不计数。
    fn process_error(&mut self, err: WorkerError) -> Result<(), SupervisorError> {
        match err.kind {
            ErrorKind::Timeout => Ok(()),
            ErrorKind::Fatal => {
                self.errors.push(err);
                Err(self.escalate("exit requested by worker"))
            }
            ErrorKind::Transient => {
                record_worker_failure();
                self.errors.push(err);
                let count = self.counters.errors.fetch_add(1, Ordering::Relaxed) + 1;
                if count as usize > MAX_ERRORS {
                    return Err(self.escalate("too many errors"));
                }
                Ok(())
            }
        }
    }

    fn recreate(&mut self) -> Result<Option<Box<dyn Worker>>, SupervisorError> {
        match (self.factory)() {
            Ok(worker) => {
                let restarts = self.counters.restarts.fetch_add(1, Ordering::Relaxed) + 1;
                record_worker_restart();
                warn!(
                    target: "edge.worker",
                    worker = %self.config.name,
                    restarts,
                    "worker_restarted"
                );
                Ok(Some(worker))
            }
            Err(err) => {
                self.process_error(err)?;
                Ok(None)
            }
        }
    }

    fn escalate(&mut self, reason: &str) -> SupervisorError {
        record_worker_escalation();
        error!(
            target: "edge.worker",
            worker = %self.config.name,
            errors = self.errors.len(),
            reason,
            "worker_escalated"
        );
        SupervisorError::Escalated {
            worker: self.config.name.clone(),
            reason: reason.to_string(),
            errors: std::mem::take(&mut self.errors),
        }
    }
}
