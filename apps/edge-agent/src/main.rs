//! 边缘 Agent：恢复或建立与控制面的会话，然后监督各对账 worker 直到收到退出信号。

mod bootstrap;
mod heartbeat;
mod registry;

use bootstrap::{AgentError, assert_state, connect, orchestrator_from};
use edge_commission::CsrSlot;
use edge_config::AgentConfig;
use edge_orchestrator::Orchestrator;
use edge_remote::{HttpTransport, RemoteClient};
use edge_status::StatusAggregator;
use edge_telemetry::{init_tracing, metrics};
use edge_vpn::OpensslGenerator;
use edge_worker::{Supervisor, SupervisorError};
use registry::{WorkerContext, registry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AgentConfig::from_env()?;
    init_tracing();

    run(config).await?;
    Ok(())
}

async fn run(config: AgentConfig) -> Result<(), AgentError> {
    let session = RemoteClient::load_session(&config.paths().session)?;
    let (endpoint, insecure) = match &session {
        Some(session) => (session.endpoint.clone(), session.insecure),
        None => (config.api_endpoint.clone(), config.api_insecure),
    };
    let transport = Arc::new(HttpTransport::new(endpoint, insecure)?);
    let client = Arc::new(connect(&config, session, transport).await?);
    assert_state(&client).await?;
    let device = client.device().await?;
    let heartbeat_interval = device
        .heartbeat_interval
        .filter(|seconds| *seconds > 0)
        .map(Duration::from_secs);

    let orchestrator: Arc<dyn Orchestrator> = Arc::new(orchestrator_from(&config));
    let mut aggregator =
        StatusAggregator::new(Duration::from_secs(config.status_timeout_seconds));
    let context = WorkerContext {
        config: config.clone(),
        client: client.clone(),
        orchestrator: orchestrator.clone(),
        generator: Arc::new(OpensslGenerator::default()),
        csr: CsrSlot::new(),
        status: aggregator.sender(),
        has_vpn_server: device.vpn_server_id.is_some(),
        heartbeat_interval,
    };

    let (escalation_tx, mut escalation_rx) = mpsc::unbounded_channel();
    let mut supervisors: Vec<Supervisor> = Vec::new();
    for (name, constructor) in registry() {
        let Some(mut supervisor) = constructor(&context) else {
            info!(target: "edge.agent", worker = name, "worker_disabled");
            continue;
        };
        supervisor.start(escalation_tx.clone())?;
        supervisors.push(supervisor);
    }
    drop(escalation_tx);

    let mut status_tick =
        tokio::time::interval(Duration::from_secs(config.status_period_seconds));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let escalated: Option<SupervisorError> = loop {
        tokio::select! {
            _ = status_tick.tick() => {
                let (status, notes) = aggregator.get_status(orchestrator.as_ref()).await;
                info!(
                    target: "edge.agent",
                    status = status.as_str(),
                    modules = notes.len(),
                    "device_status"
                );
                for note in &notes {
                    info!(target: "edge.agent", "{}", note);
                }
            }
            Some(err) = escalation_rx.recv() => {
                error!(target: "edge.agent", "worker escalated: {}", err);
                break Some(err);
            }
            _ = &mut shutdown => {
                info!(target: "edge.agent", "shutdown_requested");
                break None;
            }
        }
    };

    for supervisor in &mut supervisors {
        if let Err(err) = supervisor.stop().await {
            warn!(target: "edge.agent", worker = supervisor.name(), "stop failed: {}", err);
        }
    }
    let snapshot = metrics().snapshot();
    info!(target: "edge.agent", metrics = ?snapshot, "agent_stopped");

    match escalated {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "edge.agent", "ctrl_c handler failed: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: "edge.agent", "sigterm handler failed: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
