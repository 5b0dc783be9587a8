//! 启动：恢复会话或新建客户端，确认设备状态（必要时激活）。

use domain::{ApiKeyCredentials, DeviceState, Session};
use edge_config::{AgentConfig, CoeKind, ConfigError};
use edge_orchestrator::{OrchestratorKind, StaticOrchestrator, VpnClientState};
use edge_remote::{ApiTransport, ClientOptions, RemoteClient, RemoteError};
use edge_worker::SupervisorError;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("no device id configured and no saved session")]
    MissingDeviceId,
    #[error("device is {0}, agent will not run")]
    Decommissioned(&'static str),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// 有会话时从会话恢复；否则用配置中的设备 id 与（可选的）预分发 API key 新建。
pub async fn connect(
    config: &AgentConfig,
    session: Option<Session>,
    transport: Arc<dyn ApiTransport>,
) -> Result<RemoteClient, AgentError> {
    let session_path = config.paths().session;
    if let Some(session) = session {
        return Ok(RemoteClient::from_session(
            session,
            session_path,
            transport,
            config.min_sync_interval(),
        )
        .await?);
    }

    let device_id = config.device_id.clone().ok_or(AgentError::MissingDeviceId)?;
    let client = RemoteClient::new(
        ClientOptions {
            endpoint: config.api_endpoint.clone(),
            insecure: config.api_insecure,
            device_id,
            session_path,
            min_sync_interval: config.min_sync_interval(),
        },
        transport,
    );
    if let (Some(key), Some(secret)) = (&config.api_key, &config.api_secret) {
        client.set_credentials(ApiKeyCredentials {
            key: key.clone(),
            secret: secret.clone(),
        });
        client.login().await?;
    }
    Ok(client)
}

/// 没有凭据视为 NEW 并激活；已下线的设备直接退出。
pub async fn assert_state(client: &RemoteClient) -> Result<DeviceState, AgentError> {
    let state = if client.has_credentials() {
        client.device().await?.state
    } else {
        DeviceState::New
    };
    info!(target: "edge.agent", device_id = %client.device_id(), state = state.as_str(), "device_state");

    match state {
        DeviceState::New => {
            client.activate().await?;
            info!(target: "edge.agent", device_id = %client.device_id(), "device_activated");
        }
        state if state.is_decommissioned() => {
            error!(target: "edge.agent", state = state.as_str(), "device decommissioned, exiting");
            return Err(AgentError::Decommissioned(state.as_str()));
        }
        _ => {}
    }
    Ok(state)
}

pub fn orchestrator_from(config: &AgentConfig) -> StaticOrchestrator {
    let kind = match config.coe_kind {
        CoeKind::Swarm => OrchestratorKind::Swarm,
        CoeKind::Kubernetes => OrchestratorKind::Kubernetes,
    };
    let vpn_client = if config.vpn_client_present {
        VpnClientState::Running
    } else {
        VpnClientState::Missing
    };
    StaticOrchestrator::new(kind)
        .with_api_address(config.coe_api_host.clone(), Some(config.coe_api_port))
        .with_vpn_client(vpn_client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_contract::Operation;
    use edge_remote::{ApiCall, InMemoryApi};
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::Path;

    const DEVICE_ID: &str = "nuvlabox/5e1f";

    fn config(dir: &Path, extra: &[(&str, &str)]) -> AgentConfig {
        let mut values: HashMap<String, String> = HashMap::new();
        values.insert("EDGE_DATA_DIR".into(), dir.display().to_string());
        values.insert("EDGE_DEVICE_ID".into(), DEVICE_ID.into());
        for (key, value) in extra {
            values.insert(key.to_string(), value.to_string());
        }
        AgentConfig::from_lookup(|key| values.get(key).cloned()).expect("config")
    }

    fn api(state: &str) -> Arc<InMemoryApi> {
        let api = Arc::new(InMemoryApi::new());
        api.put_document(DEVICE_ID, json!({"id": DEVICE_ID, "state": state}));
        api
    }

    #[tokio::test]
    async fn new_device_is_activated_and_session_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path(), &[]);
        let api = api("NEW");
        api.set_activation_response(json!({"api-key": "credential/k1", "secret-key": "s1"}));

        let client = connect(&config, None, api.clone()).await.expect("connect");
        let state = assert_state(&client).await.expect("state");

        assert_eq!(state, DeviceState::New);
        assert_eq!(api.operation_bodies(Operation::Activate).len(), 1);
        let session = RemoteClient::load_session(&config.paths().session)
            .expect("load")
            .expect("saved");
        assert_eq!(session.device_id.as_deref(), Some(DEVICE_ID));
    }

    #[tokio::test]
    async fn saved_session_skips_activation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path(), &[]);
        let api = api("COMMISSIONED");
        let session = Session {
            endpoint: "https://nuvla.example.com".to_string(),
            insecure: false,
            credentials: Some(ApiKeyCredentials {
                key: "credential/k1".to_string(),
                secret: "s1".to_string(),
            }),
            device_id: Some(DEVICE_ID.to_string()),
            status_id: None,
        };

        let client = connect(&config, Some(session), api.clone()).await.expect("connect");
        let state = assert_state(&client).await.expect("state");

        assert_eq!(state, DeviceState::Commissioned);
        assert!(api.operation_bodies(Operation::Activate).is_empty());
        assert!(api.calls().contains(&ApiCall::Login {
            key: "credential/k1".to_string()
        }));
    }

    #[tokio::test]
    async fn decommissioned_device_refuses_to_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(
            dir.path(),
            &[("EDGE_API_KEY", "credential/k1"), ("EDGE_API_SECRET", "s1")],
        );
        let api = api("DECOMMISSIONED");

        let client = connect(&config, None, api).await.expect("connect");
        let err = assert_state(&client).await.expect_err("decommissioned");
        assert!(matches!(err, AgentError::Decommissioned("DECOMMISSIONED")));
    }

    #[tokio::test]
    async fn missing_device_id_without_session_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AgentConfig::from_lookup(|key| {
            (key == "EDGE_DATA_DIR").then(|| dir.path().display().to_string())
        })
        .expect("config");
        let err = connect(&config, None, api("NEW"))
            .await
            .err()
            .expect("no device id");
        assert!(matches!(err, AgentError::MissingDeviceId));
    }
}
