use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{exchange, Arguments, RemoteClient, RemoteError};

/// A named GraphQL document and the `data` field holding its result.
#[derive(Debug, Clone, Copy)]
pub struct GraphqlOperation {
    pub name: &'static str,
    pub document: &'static str,
    pub field: &'static str,
}

/// Client for third-party GraphQL peers. Operation names resolve to
/// registered documents; `variables` are the call arguments.
#[derive(Clone)]
pub struct GraphqlClient {
    http: reqwest::Client,
    endpoint: String,
    operations: &'static [GraphqlOperation],
}

impl GraphqlClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        operations: &'static [GraphqlOperation],
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            operations,
        }
    }
}

#[async_trait]
impl RemoteClient for GraphqlClient {
    async fn call(
        &self,
        operation: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> Result<Value, RemoteError> {
        let Some(registered) = self.operations.iter().find(|op| op.name == operation) else {
            return Err(RemoteError::Rejected {
                operation: operation.to_string(),
                code: Some("UNKNOWN_OPERATION".to_string()),
                messages: vec![format!("no document registered for '{operation}'")],
            });
        };

        debug!(endpoint = %self.endpoint, operation, "Calling GraphQL peer");

        let request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": registered.document, "variables": arguments }));
        let mut body = exchange(operation, request, timeout).await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages = errors
                    .iter()
                    .map(|err| {
                        err.get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("Unknown error")
                            .to_string()
                    })
                    .collect();
                return Err(RemoteError::Rejected {
                    operation: operation.to_string(),
                    code: None,
                    messages,
                });
            }
        }

        body.get_mut("data")
            .and_then(|data| data.get_mut(registered.field))
            .map(Value::take)
            .ok_or_else(|| RemoteError::Malformed {
                operation: operation.to_string(),
                reason: format!("response has no data.{}", registered.field),
            })
    }
}
