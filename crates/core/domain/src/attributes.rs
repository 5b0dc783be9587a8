//! Commissioning 属性：设备希望在远端记录上声明的“期望状态”。
//!
//! 字段以远端字段名（kebab-case）为键保存。集群信息、基础设施服务描述
//! 由编排引擎给出，按原样合并，不解释其中的角色推导方式。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// VPN 证书签名请求字段（一次性，不进入持久化快照）。
pub const VPN_CSR: &str = "vpn-csr";
/// 需要从远端记录上撤回的字段名列表。
pub const REMOVED: &str = "removed";
pub const CAPABILITIES: &str = "capabilities";
pub const SWARM_TOKEN_MANAGER: &str = "swarm-token-manager";
pub const SWARM_TOKEN_WORKER: &str = "swarm-token-worker";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissioningAttributes {
    fields: BTreeMap<String, Value>,
}

impl CommissioningAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// 写入字段；`Null` 视为未设置。
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.fields.remove(&key);
        } else {
            self.fields.insert(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// 合并一组外部给出的字段（集群信息、基础设施服务）。
    pub fn merge<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn set_capabilities(&mut self, capabilities: Vec<String>) {
        self.set(
            CAPABILITIES,
            Value::Array(capabilities.into_iter().map(Value::String).collect()),
        );
    }

    pub fn set_vpn_csr(&mut self, csr: impl Into<String>) {
        self.set(VPN_CSR, Value::String(csr.into()));
    }

    pub fn vpn_csr(&self) -> Option<&str> {
        self.fields.get(VPN_CSR).and_then(Value::as_str)
    }

    /// 去掉一次性字段后的副本，用于持久化与下一轮 diff 的基线。
    pub fn without_transient(&self) -> Self {
        let mut copy = self.clone();
        copy.fields.remove(VPN_CSR);
        copy.fields.remove(REMOVED);
        copy
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for CommissioningAttributes {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut attributes = Self::new();
        attributes.merge(iter);
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_values_are_not_stored() {
        let mut attributes = CommissioningAttributes::new();
        attributes.set("cluster-id", json!("c1"));
        attributes.set("cluster-id", Value::Null);
        assert!(attributes.is_empty());
    }

    #[test]
    fn transient_fields_are_dropped_from_snapshot() {
        let mut attributes = CommissioningAttributes::new();
        attributes.set_capabilities(vec!["NUVLA_HEARTBEAT".to_string()]);
        attributes.set_vpn_csr("-----BEGIN CERTIFICATE REQUEST-----");
        let snapshot = attributes.without_transient();
        assert!(snapshot.vpn_csr().is_none());
        assert_eq!(snapshot.get(CAPABILITIES), Some(&json!(["NUVLA_HEARTBEAT"])));
    }

    #[test]
    fn serializes_as_flat_object() {
        let attributes: CommissioningAttributes =
            [("swarm-endpoint".to_string(), json!("https://10.0.0.2:5000"))]
                .into_iter()
                .collect();
        let raw = serde_json::to_string(&attributes).expect("json");
        assert_eq!(raw, r#"{"swarm-endpoint":"https://10.0.0.2:5000"}"#);
    }
}
