use domain::PersistError;
use edge_orchestrator::OrchestratorError;
use edge_remote::RemoteError;
use edge_worker::WorkerError;

#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

impl From<CommissionError> for WorkerError {
    fn from(err: CommissionError) -> Self {
        WorkerError::transient(err.to_string())
    }
}
