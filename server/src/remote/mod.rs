//! Uniform request/response client used to reach peer services.
//!
//! Every remote interaction goes through [`RemoteClient::call`]: an operation
//! name, named arguments and a timeout in, a JSON payload or a [`RemoteError`]
//! out. Transport details (HTTP status, envelope shape, GraphQL `errors`) are
//! decoded here and never leak into the services.

pub mod graphql;
pub mod rpc;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::utils::error::AppError;

pub use graphql::{GraphqlClient, GraphqlOperation};
pub use rpc::{RpcClient, ServiceCredentials};

pub type Arguments = Map<String, Value>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{operation}: peer unreachable: {reason}")]
    Unreachable { operation: String, reason: String },

    #[error("{operation} rejected: {}", messages.join("; "))]
    Rejected {
        operation: String,
        code: Option<String>,
        messages: Vec<String>,
    },

    #[error("{operation}: malformed response: {reason}")]
    Malformed { operation: String, reason: String },
}

impl RemoteError {
    /// Machine code of a domain rejection, when the peer sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Rejected { code, messages, .. } => AppError::RemoteRejected {
                code,
                message: messages.join("; "),
            },
            other => AppError::UpstreamUnavailable(other.to_string()),
        }
    }
}

#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn call(
        &self,
        operation: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> Result<Value, RemoteError>;
}

/// Turns a `json!({...})` literal into call arguments.
pub fn arguments(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn decode<T: DeserializeOwned>(operation: &str, payload: Value) -> Result<T, RemoteError> {
    serde_json::from_value(payload).map_err(|e| RemoteError::Malformed {
        operation: operation.to_string(),
        reason: e.to_string(),
    })
}

fn transport_error(operation: &str, timeout: Duration, err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout {
            operation: operation.to_string(),
            after: timeout,
        }
    } else {
        RemoteError::Unreachable {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Sends the request and parses the body as JSON.
///
/// A body that is not JSON is `Unreachable` when the status is a server or
/// gateway error (a proxy answered instead of the peer) and `Malformed`
/// otherwise.
async fn exchange(
    operation: &str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<Value, RemoteError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| transport_error(operation, timeout, e))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(operation, timeout, e))?;

    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => Ok(value),
        Err(_) if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
            Err(RemoteError::Unreachable {
                operation: operation.to_string(),
                reason: format!("HTTP {status}"),
            })
        }
        Err(e) => Err(RemoteError::Malformed {
            operation: operation.to_string(),
            reason: format!("HTTP {status}: {e}"),
        }),
    }
}
