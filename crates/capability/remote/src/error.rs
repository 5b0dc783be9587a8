use domain::PersistError;

/// 远端资源客户端错误。
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("activation failed: {0}")]
    Activation(String),
    #[error("invalid session: {0}")]
    SessionValidation(String),
    #[error("missing resource: {0}")]
    Missing(String),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => RemoteError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => RemoteError::Transport(err.to_string()),
        }
    }
}
