use crate::error::VpnError;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// 生成私钥与证书签名请求，输出到给定文件。
#[async_trait]
pub trait CertificateGenerator: Send + Sync {
    async fn generate(
        &self,
        key_path: &Path,
        csr_path: &Path,
        common_name: &str,
    ) -> Result<(), VpnError>;
}

/// 调用 `openssl req` 生成 secp521r1 私钥与 CSR。
#[derive(Debug, Clone)]
pub struct OpensslGenerator {
    program: String,
}

impl Default for OpensslGenerator {
    fn default() -> Self {
        Self {
            program: "openssl".to_string(),
        }
    }
}

impl OpensslGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(key_path: &Path, csr_path: &Path, common_name: &str) -> Vec<String> {
        vec![
            "req".to_string(),
            "-batch".to_string(),
            "-nodes".to_string(),
            "-newkey".to_string(),
            "ec".to_string(),
            "-pkeyopt".to_string(),
            "ec_paramgen_curve:secp521r1".to_string(),
            "-keyout".to_string(),
            key_path.display().to_string(),
            "-out".to_string(),
            csr_path.display().to_string(),
            "-subj".to_string(),
            format!("/CN={}", common_name),
        ]
    }
}

#[async_trait]
impl CertificateGenerator for OpensslGenerator {
    async fn generate(
        &self,
        key_path: &Path,
        csr_path: &Path,
        common_name: &str,
    ) -> Result<(), VpnError> {
        let args = Self::args(key_path, csr_path, common_name);
        debug!(target: "edge.vpn", program = %self.program, ?args, "certificate_generation");
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|err| VpnError::CertificateGeneration(format!("{}: {}", self.program, err)))?;
        if !output.status.success() {
            return Err(VpnError::CertificateGeneration(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        info!(target: "edge.vpn", common_name, "certificate_generated");
        Ok(())
    }
}
