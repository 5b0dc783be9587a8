use std::fmt;

/// worker 错误分类，监督器按此分派。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 偶发故障：计数、记录并重建 worker。
    Transient,
    /// worker 判定配置永远无法成功：立即升级。
    Fatal,
    /// 有界等待超时：提前结束本轮，下个周期重试。
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// worker 边界上的错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct WorkerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl WorkerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }
}

/// 监督器错误。
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// worker 请求退出或失败次数超过上限；`errors` 为全部已记录的失败。
    #[error("worker {worker} escalated: {reason} ({} errors recorded)", errors.len())]
    Escalated {
        worker: String,
        reason: String,
        errors: Vec<WorkerError>,
    },
    #[error("worker {0} did not stop within one period")]
    StopTimeout(String),
    #[error("worker {0} is already running")]
    AlreadyStarted(String),
}
