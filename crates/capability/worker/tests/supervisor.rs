use async_trait::async_trait;
use edge_worker::{
    ErrorKind, MAX_ERRORS, Supervisor, SupervisorConfig, SupervisorError, Worker, WorkerError,
    WorkerFactory,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// 按脚本依次返回结果，脚本耗尽后一直成功。
struct ScriptedWorker {
    script: Arc<std::sync::Mutex<Vec<Result<(), WorkerError>>>>,
    performed: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn perform(&mut self, action: &str) -> Result<(), WorkerError> {
        let _ = self.performed.send(action.to_string());
        let mut script = self.script.lock().expect("script lock");
        if script.is_empty() {
            Ok(())
        } else {
            script.remove(0)
        }
    }
}

struct AlwaysFailing {
    kind: ErrorKind,
}

#[async_trait]
impl Worker for AlwaysFailing {
    async fn perform(&mut self, _action: &str) -> Result<(), WorkerError> {
        Err(WorkerError::new(self.kind, "boom"))
    }
}

fn failing_factory(kind: ErrorKind, created: Arc<AtomicUsize>) -> WorkerFactory {
    Arc::new(move || {
        created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(AlwaysFailing { kind }) as Box<dyn Worker>)
    })
}

fn config(actions: &[&str]) -> SupervisorConfig {
    SupervisorConfig::new("test-worker", Duration::from_secs(10), actions)
}

#[tokio::test(start_paused = true)]
async fn ordinary_errors_restart_until_ceiling_then_escalate() {
    let created = Arc::new(AtomicUsize::new(0));
    let mut supervisor = Supervisor::new(
        config(&["run"]),
        failing_factory(ErrorKind::Transient, created.clone()),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    supervisor.start(tx).expect("start");

    let escalation = rx.recv().await.expect("escalation");
    match escalation {
        SupervisorError::Escalated { worker, errors, .. } => {
            assert_eq!(worker, "test-worker");
            assert_eq!(errors.len(), MAX_ERRORS + 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(supervisor.restarts(), MAX_ERRORS as u64);
    assert_eq!(supervisor.error_count(), MAX_ERRORS as u64 + 1);
    assert_eq!(created.load(Ordering::SeqCst), MAX_ERRORS + 1);
}

#[tokio::test(start_paused = true)]
async fn fatal_error_escalates_on_first_occurrence() {
    let created = Arc::new(AtomicUsize::new(0));
    let mut supervisor = Supervisor::new(
        config(&["run"]),
        failing_factory(ErrorKind::Fatal, created.clone()),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    supervisor.start(tx).expect("start");

    let escalation = rx.recv().await.expect("escalation");
    assert!(matches!(
        escalation,
        SupervisorError::Escalated { ref errors, .. } if errors.len() == 1
    ));
    assert_eq!(supervisor.restarts(), 0);
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_ends_tick_without_counting() {
    let script = Arc::new(std::sync::Mutex::new(vec![
        Err(WorkerError::timeout("credential not ready")),
        Ok(()),
    ]));
    let (performed_tx, mut performed_rx) = mpsc::unbounded_channel();
    let factory: WorkerFactory = {
        let script = script.clone();
        Arc::new(move || {
            Ok(Box::new(ScriptedWorker {
                script: script.clone(),
                performed: performed_tx.clone(),
            }) as Box<dyn Worker>)
        })
    };
    let mut supervisor = Supervisor::new(config(&["first", "second"]), factory);
    let (tx, mut rx) = mpsc::unbounded_channel();
    supervisor.start(tx).expect("start");

    // 第一轮在 first 超时，second 不执行；第二轮两个动作都执行。
    assert_eq!(performed_rx.recv().await.as_deref(), Some("first"));
    assert_eq!(performed_rx.recv().await.as_deref(), Some("first"));
    assert_eq!(performed_rx.recv().await.as_deref(), Some("second"));

    supervisor.stop().await.expect("stop");
    assert_eq!(supervisor.error_count(), 0);
    assert_eq!(supervisor.restarts(), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn transient_error_recreates_worker_and_keeps_running() {
    let script = Arc::new(std::sync::Mutex::new(vec![Err(WorkerError::transient(
        "connection reset",
    ))]));
    let created = Arc::new(AtomicUsize::new(0));
    let (performed_tx, mut performed_rx) = mpsc::unbounded_channel();
    let factory: WorkerFactory = {
        let script = script.clone();
        let created = created.clone();
        Arc::new(move || {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedWorker {
                script: script.clone(),
                performed: performed_tx.clone(),
            }) as Box<dyn Worker>)
        })
    };
    let mut supervisor = Supervisor::new(config(&["run"]), factory);
    let (tx, _rx) = mpsc::unbounded_channel();
    supervisor.start(tx).expect("start");

    for _ in 0..3 {
        performed_rx.recv().await.expect("performed");
    }
    supervisor.stop().await.expect("stop");
    assert_eq!(supervisor.error_count(), 1);
    assert_eq!(supervisor.restarts(), 1);
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn initial_delay_is_clamped_to_period() {
    let (performed_tx, mut performed_rx) = mpsc::unbounded_channel();
    let script = Arc::new(std::sync::Mutex::new(Vec::new()));
    let factory: WorkerFactory = Arc::new(move || {
        Ok(Box::new(ScriptedWorker {
            script: script.clone(),
            performed: performed_tx.clone(),
        }) as Box<dyn Worker>)
    });
    let mut supervisor = Supervisor::new(
        config(&["run"]).with_initial_delay(Duration::from_secs(3600)),
        factory,
    );
    let (tx, _rx) = mpsc::unbounded_channel();
    let started = tokio::time::Instant::now();
    supervisor.start(tx).expect("start");

    performed_rx.recv().await.expect("performed");
    assert!(started.elapsed() <= Duration::from_secs(10));
    assert_eq!(supervisor.ticks(), 1);
    supervisor.stop().await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn stop_before_first_tick_runs_nothing() {
    let created = Arc::new(AtomicUsize::new(0));
    let mut supervisor = Supervisor::new(
        config(&["run"]).with_initial_delay(Duration::from_secs(5)),
        failing_factory(ErrorKind::Fatal, created),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    supervisor.start(tx).expect("start");
    supervisor.stop().await.expect("stop");

    assert_eq!(supervisor.ticks(), 0);
    assert!(!supervisor.is_running());
    assert!(rx.try_recv().is_err());
}

/// 每轮之后请求固定周期。
struct RetunedWorker {
    performed: mpsc::UnboundedSender<tokio::time::Instant>,
    period: Duration,
}

#[async_trait]
impl Worker for RetunedWorker {
    async fn perform(&mut self, _action: &str) -> Result<(), WorkerError> {
        let _ = self.performed.send(tokio::time::Instant::now());
        Ok(())
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }
}

#[tokio::test(start_paused = true)]
async fn worker_requested_period_replaces_configured_one() {
    let (performed_tx, mut performed_rx) = mpsc::unbounded_channel();
    let factory: WorkerFactory = Arc::new(move || {
        Ok(Box::new(RetunedWorker {
            performed: performed_tx.clone(),
            period: Duration::from_secs(30),
        }) as Box<dyn Worker>)
    });
    let mut supervisor = Supervisor::new(config(&["run"]), factory);
    assert_eq!(supervisor.period(), Duration::from_secs(10));
    let (tx, _rx) = mpsc::unbounded_channel();
    supervisor.start(tx).expect("start");

    let first = performed_rx.recv().await.expect("first tick");
    let second = performed_rx.recv().await.expect("second tick");
    let gap = second - first;
    assert!(gap >= Duration::from_secs(30) && gap < Duration::from_secs(31));
    assert_eq!(supervisor.period(), Duration::from_secs(30));
    supervisor.stop().await.expect("stop");
}
