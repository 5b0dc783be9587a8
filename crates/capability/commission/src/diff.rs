use domain::CommissioningAttributes;
use domain::attributes::{REMOVED, VPN_CSR};
use serde_json::{Map, Value};

/// 计算需要提交的字段：新增或变化的字段，外加 `removed` 列出已消失的字段名。
///
/// 没有任何变化时返回空 map。
pub fn diff_payload(
    last: &CommissioningAttributes,
    current: &CommissioningAttributes,
) -> Map<String, Value> {
    let mut payload: Map<String, Value> = current
        .iter()
        .filter(|(key, _)| key.as_str() != REMOVED)
        .filter(|(key, value)| last.get(key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let removed: Vec<Value> = last
        .iter()
        .map(|(key, _)| key)
        .filter(|key| key.as_str() != VPN_CSR && key.as_str() != REMOVED)
        .filter(|key| current.get(key).is_none())
        .map(|key| Value::String(key.clone()))
        .collect();
    if !removed.is_empty() {
        payload.insert(REMOVED.to_string(), Value::Array(removed));
    }
    payload
}
