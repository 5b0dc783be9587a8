//! 远端资源客户端
//!
//! - [`transport`]：资源协议抽象（GET / 检索 / 操作 / 编辑 / 登录）
//! - [`http`]：reqwest 实现
//! - [`in_memory`]：内存实现（测试与演示）
//! - [`client`]：带 TTL 缓存的资源读取与写操作

pub mod client;
pub mod error;
pub mod http;
pub mod in_memory;
pub mod transport;

pub use client::{
    ClientOptions, FULL_RESOURCE_SYNC, MIN_SYNC_INTERVAL, RemoteClient, Resource, ResourceKind,
};
pub use error::RemoteError;
pub use http::HttpTransport;
pub use in_memory::{ApiCall, InMemoryApi};
pub use transport::ApiTransport;
