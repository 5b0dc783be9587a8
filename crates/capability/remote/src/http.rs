//! 基于 reqwest 的传输层实现。

use crate::error::RemoteError;
use crate::transport::ApiTransport;
use api_contract::{
    LoginRequest, Operation, SESSION_COLLECTION, SearchResponse, operation_url, resource_url,
};
use async_trait::async_trait;
use domain::session::format_host;
use edge_telemetry::new_request_id;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTPS JSON 资源协议客户端。登录后的会话保存在 cookie 中。
#[derive(Clone)]
pub struct HttpTransport {
    endpoint: String,
    client: Client,
}

impl HttpTransport {
    /// `endpoint` 缺少协议时按 https 处理。
    pub fn new(endpoint: impl Into<String>, insecure: bool) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(insecure)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(Self {
            endpoint: format_host(&endpoint.into()),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Value, RemoteError> {
        let request_id = new_request_id();
        debug!(target: "edge.remote", request_id = %request_id, action, "remote_request");
        let response = request
            .header(REQUEST_ID_HEADER, request_id.as_str())
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json(response: Response) -> Result<Value, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|err| RemoteError::Decode(err.to_string()))
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn get(&self, id: &str, select: Option<&[&str]>) -> Result<Value, RemoteError> {
        let mut request = self.client.get(resource_url(&self.endpoint, id));
        if let Some(fields) = select {
            request = request.query(&[("select", fields.join(","))]);
        }
        self.send(request, "get").await
    }

    async fn search(&self, collection: &str, filter: &str) -> Result<Vec<Value>, RemoteError> {
        let request = self
            .client
            .get(resource_url(&self.endpoint, collection))
            .query(&[("filter", filter)]);
        let body = self.send(request, "search").await?;
        let response: SearchResponse<Value> =
            serde_json::from_value(body).map_err(|err| RemoteError::Decode(err.to_string()))?;
        Ok(response.resources)
    }

    async fn operation(
        &self,
        id: &str,
        operation: Operation,
        body: Option<Value>,
    ) -> Result<Value, RemoteError> {
        let request = self
            .client
            .post(operation_url(&self.endpoint, id, operation))
            .json(&body.unwrap_or_else(|| Value::Object(Default::default())));
        self.send(request, operation.as_str()).await
    }

    async fn edit(
        &self,
        id: &str,
        body: Value,
        fields_to_clear: &[String],
    ) -> Result<Value, RemoteError> {
        let mut request = self.client.put(resource_url(&self.endpoint, id)).json(&body);
        if !fields_to_clear.is_empty() {
            request = request.query(&[("select", fields_to_clear.join(","))]);
        }
        self.send(request, "edit").await
    }

    async fn login_api_key(&self, key: &str, secret: &str) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(resource_url(&self.endpoint, SESSION_COLLECTION))
            .json(&LoginRequest::api_key(key, secret));
        self.send(request, "login").await.map(|_| ())
    }
}
