use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{exchange, Arguments, RemoteClient, RemoteError};
use crate::auth::{Role, TokenKeys};
use crate::utils::response::ApiErrorBody;

/// Lifetime of the service token attached to one peer call.
const SERVICE_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Signs a fresh `SERVICE` token for each outgoing call.
#[derive(Clone)]
pub struct ServiceCredentials {
    pub keys: Arc<TokenKeys>,
    pub subject: String,
}

/// Client for the `POST /rpc` operation registry exposed by our own services.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Option<ServiceCredentials>,
}

#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

impl RpcClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: ServiceCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

#[async_trait]
impl RemoteClient for RpcClient {
    async fn call(
        &self,
        operation: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> Result<Value, RemoteError> {
        debug!(endpoint = %self.endpoint, operation, "Calling peer");

        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "operation": operation, "arguments": arguments }));

        if let Some(credentials) = &self.credentials {
            let token = credentials
                .keys
                .issue(&credentials.subject, Role::Service, SERVICE_TOKEN_TTL)
                .map_err(|e| RemoteError::Unreachable {
                    operation: operation.to_string(),
                    reason: e.to_string(),
                })?;
            request = request.bearer_auth(token);
        }

        let body = exchange(operation, request, timeout).await?;
        let envelope: Envelope =
            serde_json::from_value(body).map_err(|e| RemoteError::Malformed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        match envelope {
            Envelope {
                success: true,
                data,
                ..
            } => Ok(data.unwrap_or(Value::Null)),
            Envelope {
                error: Some(error), ..
            } => Err(RemoteError::Rejected {
                operation: operation.to_string(),
                messages: error.messages(),
                code: Some(error.code),
            }),
            Envelope { .. } => Err(RemoteError::Malformed {
                operation: operation.to_string(),
                reason: "failure envelope without an error body".to_string(),
            }),
        }
    }
}
