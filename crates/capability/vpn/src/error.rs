use domain::PersistError;
use edge_remote::RemoteError;
use edge_worker::WorkerError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum VpnError {
    /// 设备记录没有 VPN 服务端，不应调度 VPN worker。
    #[error("device has no vpn server")]
    NoVpnServer,
    /// 远端要求 VPN，但本地没有 VPN 客户端。
    #[error("vpn configuration mismatch: {0}")]
    ConfigurationMismatch(String),
    #[error("vpn credential not created within {0:?}")]
    CredentialCreationTimeout(Duration),
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),
    #[error("vpn server {0} not available")]
    ServerUnavailable(String),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

impl From<VpnError> for WorkerError {
    fn from(err: VpnError) -> Self {
        let message = err.to_string();
        match err {
            VpnError::NoVpnServer | VpnError::ConfigurationMismatch(_) => {
                WorkerError::fatal(message)
            }
            VpnError::CredentialCreationTimeout(_) => WorkerError::timeout(message),
            _ => WorkerError::transient(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_worker::ErrorKind;

    #[test]
    fn errors_map_to_supervisor_kinds() {
        let kind = |err: VpnError| WorkerError::from(err).kind;
        assert_eq!(kind(VpnError::NoVpnServer), ErrorKind::Fatal);
        assert_eq!(
            kind(VpnError::ConfigurationMismatch("no client".into())),
            ErrorKind::Fatal
        );
        assert_eq!(
            kind(VpnError::CredentialCreationTimeout(Duration::from_secs(75))),
            ErrorKind::Timeout
        );
        assert_eq!(
            kind(VpnError::CertificateGeneration("exit 1".into())),
            ErrorKind::Transient
        );
    }
}
