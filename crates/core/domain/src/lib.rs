pub mod attributes;
pub mod persist;
pub mod resources;
pub mod session;
pub mod status;

pub use attributes::CommissioningAttributes;
pub use persist::PersistError;
pub use resources::{
    CredentialResource, DeviceRecord, DeviceState, ServerResource, StatusRecord, VpnEndpoint,
};
pub use session::{ApiKeyCredentials, Session};
pub use status::{DeviceStatus, ModuleStatus, StatusReport};

/// 取远端资源 id 的 uuid 部分（`nuvlabox/<uuid>` → `<uuid>`）。
pub fn resource_uuid(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

/// 当前时间（毫秒）。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
