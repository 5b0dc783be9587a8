//! 内存传输层实现
//!
//! 仅用于本地演示和测试：保存资源文档、检索结果，并记录每一次调用。

use crate::error::RemoteError;
use crate::transport::ApiTransport;
use api_contract::Operation;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// 一次记录下来的远端调用。
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Get {
        id: String,
        select: Option<Vec<String>>,
    },
    Search {
        collection: String,
        filter: String,
    },
    Operation {
        id: String,
        operation: Operation,
        body: Option<Value>,
    },
    Edit {
        id: String,
        body: Value,
        fields_to_clear: Vec<String>,
    },
    Login {
        key: String,
    },
}

/// 内存 API。
#[derive(Default)]
pub struct InMemoryApi {
    documents: RwLock<HashMap<String, Value>>,
    collections: RwLock<HashMap<String, Vec<Value>>>,
    activation: RwLock<Option<Value>>,
    heartbeat: RwLock<Option<Value>>,
    failing: RwLock<HashSet<Operation>>,
    calls: RwLock<Vec<ApiCall>>,
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入（覆盖）资源文档。
    pub fn put_document(&self, id: impl Into<String>, document: Value) {
        if let Ok(mut map) = self.documents.write() {
            map.insert(id.into(), document);
        }
    }

    pub fn remove_document(&self, id: &str) {
        if let Ok(mut map) = self.documents.write() {
            map.remove(id);
        }
    }

    /// 设置集合检索返回的资源列表（不解释过滤条件）。
    pub fn set_collection(&self, collection: impl Into<String>, resources: Vec<Value>) {
        if let Ok(mut map) = self.collections.write() {
            map.insert(collection.into(), resources);
        }
    }

    /// 设置 activate 操作的响应体；未设置时 activate 返回 409。
    pub fn set_activation_response(&self, response: Value) {
        if let Ok(mut slot) = self.activation.write() {
            *slot = Some(response);
        }
    }

    /// 设置 heartbeat 操作的响应体；未设置时返回空 job 列表。
    pub fn set_heartbeat_response(&self, response: Value) {
        if let Ok(mut slot) = self.heartbeat.write() {
            *slot = Some(response);
        }
    }

    /// 让指定操作返回 500。
    pub fn fail_operation(&self, operation: Operation, failing: bool) {
        if let Ok(mut set) = self.failing.write() {
            if failing {
                set.insert(operation);
            } else {
                set.remove(&operation);
            }
        }
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.read().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// 指定资源被 GET 的次数。
    pub fn get_count(&self, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ApiCall::Get { id: called, .. } if called == id))
            .count()
    }

    pub fn search_count(&self, collection: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(call, ApiCall::Search { collection: called, .. } if called == collection)
            })
            .count()
    }

    /// 指定操作每次调用时携带的请求体。
    pub fn operation_bodies(&self, operation: Operation) -> Vec<Option<Value>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Operation {
                    operation: called,
                    body,
                    ..
                } if called == operation => Some(body),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) {
        if let Ok(mut calls) = self.calls.write() {
            calls.push(call);
        }
    }

    fn is_failing(&self, operation: Operation) -> bool {
        self.failing
            .read()
            .map(|set| set.contains(&operation))
            .unwrap_or(false)
    }
}

fn not_found(id: &str) -> RemoteError {
    RemoteError::Status {
        status: 404,
        body: format!("{} not found", id),
    }
}

#[async_trait]
impl ApiTransport for InMemoryApi {
    async fn get(&self, id: &str, select: Option<&[&str]>) -> Result<Value, RemoteError> {
        self.record(ApiCall::Get {
            id: id.to_string(),
            select: select.map(|fields| fields.iter().map(|field| field.to_string()).collect()),
        });
        let document = self
            .documents
            .read()
            .ok()
            .and_then(|map| map.get(id).cloned())
            .ok_or_else(|| not_found(id))?;
        let Some(fields) = select else {
            return Ok(document);
        };
        let selected = match document {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| key == "id" || fields.contains(&key.as_str()))
                    .collect(),
            ),
            other => other,
        };
        Ok(selected)
    }

    async fn search(&self, collection: &str, filter: &str) -> Result<Vec<Value>, RemoteError> {
        self.record(ApiCall::Search {
            collection: collection.to_string(),
            filter: filter.to_string(),
        });
        Ok(self
            .collections
            .read()
            .ok()
            .and_then(|map| map.get(collection).cloned())
            .unwrap_or_default())
    }

    async fn operation(
        &self,
        id: &str,
        operation: Operation,
        body: Option<Value>,
    ) -> Result<Value, RemoteError> {
        self.record(ApiCall::Operation {
            id: id.to_string(),
            operation,
            body,
        });
        if self.is_failing(operation) {
            return Err(RemoteError::Status {
                status: 500,
                body: format!("{} failed", operation.as_str()),
            });
        }
        match operation {
            Operation::Activate => self
                .activation
                .read()
                .ok()
                .and_then(|slot| slot.clone())
                .ok_or_else(|| RemoteError::Status {
                    status: 409,
                    body: "already activated".to_string(),
                }),
            Operation::Commission => Ok(json!({"status": 200, "message": "commissioned"})),
            Operation::Heartbeat => Ok(self
                .heartbeat
                .read()
                .ok()
                .and_then(|slot| slot.clone())
                .unwrap_or_else(|| json!({"jobs": []}))),
        }
    }

    async fn edit(
        &self,
        id: &str,
        body: Value,
        fields_to_clear: &[String],
    ) -> Result<Value, RemoteError> {
        self.record(ApiCall::Edit {
            id: id.to_string(),
            body: body.clone(),
            fields_to_clear: fields_to_clear.to_vec(),
        });
        let mut map = self.documents.write().map_err(|_| not_found(id))?;
        let document = map.get_mut(id).ok_or_else(|| not_found(id))?;
        if let (Value::Object(target), Value::Object(delta)) = (document, body) {
            for field in fields_to_clear {
                target.remove(field);
            }
            target.extend(delta);
        }
        Ok(json!({"jobs": []}))
    }

    async fn login_api_key(&self, key: &str, _secret: &str) -> Result<(), RemoteError> {
        self.record(ApiCall::Login {
            key: key.to_string(),
        });
        Ok(())
    }
}
