//! VPN 凭据与证书生命周期
//!
//! - [`certificate`]：生成 EC 私钥与 CSR（外部 openssl）
//! - [`client_config`]：OpenVPN 客户端配置渲染
//! - [`manager`]：判断是否需要重新签发、等待凭据、写入客户端配置

pub mod certificate;
pub mod client_config;
pub mod error;
pub mod manager;

pub use certificate::{CertificateGenerator, OpensslGenerator};
pub use client_config::VpnClientConfig;
pub use error::VpnError;
pub use manager::{
    CREDENTIAL_POLL_INTERVAL, CREDENTIAL_TIMEOUT, VPN_ACTION, VPN_MODULE, VpnManager, VpnPaths,
    VpnSettings, VpnState, needs_commission,
};
