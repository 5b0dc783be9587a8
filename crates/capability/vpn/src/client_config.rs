//! OpenVPN 客户端配置。
//!
//! [`VpnClientConfig`] 由服务端描述与凭据合并而来，持久化为 JSON 明文记录；
//! [`VpnClientConfig::render`] 生成 VPN 客户端进程读取的配置文件。

use domain::{CredentialResource, ServerResource, VpnEndpoint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VpnClientConfig {
    pub vpn_interface_name: String,
    #[serde(default)]
    pub vpn_ca_certificate: String,
    /// 服务端（基础设施服务）给出的中间 CA。
    #[serde(default)]
    pub vpn_intermediate_ca_is: Vec<String>,
    /// 凭据给出的中间 CA。
    #[serde(default)]
    pub vpn_intermediate_ca: Vec<String>,
    #[serde(default)]
    pub vpn_certificate: String,
    #[serde(default)]
    pub vpn_shared_key: String,
    #[serde(default)]
    pub vpn_common_name_prefix: String,
    #[serde(default)]
    pub vpn_endpoints: Vec<VpnEndpoint>,
    #[serde(default)]
    pub vpn_extra_config: String,
}

impl VpnClientConfig {
    pub fn assemble(
        server: &ServerResource,
        credential: &CredentialResource,
        interface_name: &str,
        extra_config: &str,
    ) -> Self {
        Self {
            vpn_interface_name: interface_name.to_string(),
            vpn_ca_certificate: server.vpn_ca_certificate.clone().unwrap_or_default(),
            vpn_intermediate_ca_is: server.vpn_intermediate_ca.clone().unwrap_or_default(),
            vpn_intermediate_ca: credential.vpn_intermediate_ca.clone().unwrap_or_default(),
            vpn_certificate: credential.vpn_certificate.clone().unwrap_or_default(),
            vpn_shared_key: server.vpn_shared_key.clone().unwrap_or_default(),
            vpn_common_name_prefix: server.vpn_common_name_prefix.clone().unwrap_or_default(),
            vpn_endpoints: server.vpn_endpoints.clone(),
            vpn_extra_config: extra_config.to_string(),
        }
    }

    /// 渲染客户端配置；私钥不进入明文记录，只在这里写入。
    pub fn render(&self, private_key: &str) -> String {
        format!(
            "client

dev {interface}
dev-type tun
nobind

# CA certificate
<ca>
{ca}
{ca_is}
{ca_credential}
</ca>

# Client Certificate
<cert>
{cert}
</cert>

# Client Key
<key>
{key}
</key>

# Shared key
<tls-crypt>
{shared_key}
</tls-crypt>

remote-cert-tls server

verify-x509-name \"{prefix}\" name-prefix

script-security 2
up /opt/nuvlaedge/scripts/vpn-client/get_ip.sh

auth-nocache
auth-retry nointeract

connect-retry 15
connect-retry-max 4

ping 60
ping-restart 120
compress lz4

{endpoints}

{extra}
",
            interface = self.vpn_interface_name,
            ca = self.vpn_ca_certificate.trim_end(),
            ca_is = join_pem(&self.vpn_intermediate_ca_is),
            ca_credential = join_pem(&self.vpn_intermediate_ca),
            cert = self.vpn_certificate.trim_end(),
            key = private_key.trim_end(),
            shared_key = self.vpn_shared_key.trim_end(),
            prefix = self.vpn_common_name_prefix,
            endpoints = map_endpoints(&self.vpn_endpoints),
            extra = self.vpn_extra_config,
        )
    }
}

/// 每个接入点一个 `<connection>` 段，保持服务端给出的顺序。
pub fn map_endpoints(endpoints: &[VpnEndpoint]) -> String {
    endpoints
        .iter()
        .map(|endpoint| {
            format!(
                "\n<connection>\nremote {} {} {}\n</connection>\n",
                endpoint.endpoint, endpoint.port, endpoint.protocol
            )
        })
        .collect()
}

fn join_pem(blocks: &[String]) -> String {
    blocks
        .iter()
        .map(|block| block.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}
