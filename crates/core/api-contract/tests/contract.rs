use api_contract::{
    ActivationResponse, LoginRequest, Operation, OperationResponse, SearchResponse,
    operation_url, resource_url, vpn_credential_filter,
};
use serde_json::Value;

#[test]
fn operation_url_joins_resource_and_operation() {
    let url = operation_url("https://nuvla.io/", "nuvlabox/abc", Operation::Commission);
    assert_eq!(url, "https://nuvla.io/api/nuvlabox/abc/commission");
    assert_eq!(
        resource_url("https://nuvla.io", "credential"),
        "https://nuvla.io/api/credential"
    );
}

#[test]
fn vpn_filter_contains_device_and_server() {
    let filter = vpn_credential_filter("nuvlabox/abc", "infrastructure-service/vpn");
    assert!(filter.contains("vpn-common-name=\"nuvlabox/abc\""));
    assert!(filter.contains("parent=\"infrastructure-service/vpn\""));
    assert!(filter.starts_with("method=\"create-credential-vpn-nuvlabox\""));
}

#[test]
fn activation_response_is_kebab_case() {
    let payload = r#"{"api-key":"credential/1","secret-key":"s3cr3t"}"#;
    let response: ActivationResponse = serde_json::from_str(payload).expect("parse");
    assert_eq!(response.api_key.as_deref(), Some("credential/1"));
    assert_eq!(response.secret_key.as_deref(), Some("s3cr3t"));

    let empty: ActivationResponse = serde_json::from_str("{}").expect("parse empty");
    assert!(empty.api_key.is_none());
}

#[test]
fn login_request_uses_api_key_template() {
    let value = serde_json::to_value(LoginRequest::api_key("k", "s")).expect("serialize");
    assert_eq!(
        value.pointer("/template/href"),
        Some(&Value::String("session-template/api-key".to_string()))
    );
}

#[test]
fn search_response_defaults_to_empty() {
    let response: SearchResponse<Value> = serde_json::from_str(r#"{"count":0}"#).expect("parse");
    assert!(response.resources.is_empty());

    let ops: OperationResponse =
        serde_json::from_str(r#"{"jobs":["job/1"],"doc-last-updated":"2024-01-01"}"#).expect("parse");
    assert_eq!(ops.jobs, vec!["job/1".to_string()]);
}
