//! 远端 API 传输层抽象。

use crate::error::RemoteError;
use api_contract::Operation;
use async_trait::async_trait;
use serde_json::Value;

/// 资源协议的最小操作集合。
///
/// 资源 id 与集合名均为相对路径（如 `nuvlabox/<uuid>`），由实现拼接 endpoint。
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// 读取单个资源；`select` 为 `None` 时读取全部字段。
    async fn get(&self, id: &str, select: Option<&[&str]>) -> Result<Value, RemoteError>;

    /// 按过滤条件检索集合。
    async fn search(&self, collection: &str, filter: &str) -> Result<Vec<Value>, RemoteError>;

    /// 调用资源操作（activate / commission / heartbeat）。
    async fn operation(
        &self,
        id: &str,
        operation: Operation,
        body: Option<Value>,
    ) -> Result<Value, RemoteError>;

    /// 编辑资源；`fields_to_clear` 中的字段在远端被删除。
    async fn edit(
        &self,
        id: &str,
        body: Value,
        fields_to_clear: &[String],
    ) -> Result<Value, RemoteError>;

    async fn login_api_key(&self, key: &str, secret: &str) -> Result<(), RemoteError>;
}
