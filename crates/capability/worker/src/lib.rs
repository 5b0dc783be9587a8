//! 周期 worker 监督：按周期执行动作、隔离并计数失败、重建 worker、必要时升级。

pub mod error;
pub mod supervisor;

pub use error::{ErrorKind, SupervisorError, WorkerError};
pub use supervisor::{MAX_ERRORS, Supervisor, SupervisorConfig, Worker, WorkerFactory};
