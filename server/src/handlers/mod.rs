//! `POST /rpc` entry points. Each authority decodes the body into its own
//! operation enum, so every accepted operation name maps to exactly one
//! service method with a fixed argument shape.

pub mod booking;
pub mod event;
pub mod ticket;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::auth::TokenKeys;
use crate::utils::error::AppError;
use crate::utils::response::success;

/// Shared state of one authority's RPC router.
pub struct RpcState<S> {
    pub keys: Arc<TokenKeys>,
    pub service: Arc<S>,
}

impl<S> Clone for RpcState<S> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            service: self.service.clone(),
        }
    }
}

impl<S> FromRef<RpcState<S>> for Arc<TokenKeys> {
    fn from_ref(state: &RpcState<S>) -> Self {
        state.keys.clone()
    }
}

#[derive(Deserialize)]
struct RpcRequest {
    operation: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

/// Decodes `{"operation": ..., "arguments": {...}}` into an operation enum.
/// `arguments` may be omitted for operations that take none.
pub fn parse_operation<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    let request: RpcRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Malformed request body: {e}")))?;

    let tagged = json!({
        "operation": request.operation,
        "arguments": Value::Object(request.arguments.unwrap_or_default()),
    });
    serde_json::from_value(tagged).map_err(|e| {
        AppError::Validation(format!("Invalid call to '{}': {e}", request.operation))
    })
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "eventhub",
    };

    success(payload, "Health check successful")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(
        tag = "operation",
        content = "arguments",
        rename_all = "camelCase",
        rename_all_fields = "camelCase"
    )]
    enum Probe {
        Ping {},
        Echo { ticket_id: i64 },
    }

    #[test]
    fn test_operations_decode_by_name() {
        let echo: Probe =
            parse_operation(br#"{"operation": "echo", "arguments": {"ticketId": 3}}"#).unwrap();
        assert_eq!(echo, Probe::Echo { ticket_id: 3 });

        let ping: Probe = parse_operation(br#"{"operation": "ping"}"#).unwrap();
        assert_eq!(ping, Probe::Ping {});
    }

    #[test]
    fn test_unknown_operation_and_bad_arguments_are_validation_errors() {
        assert!(matches!(
            parse_operation::<Probe>(br#"{"operation": "drop"}"#),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse_operation::<Probe>(br#"{"operation": "echo", "arguments": {"ticketId": "x"}}"#),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse_operation::<Probe>(b"not json"),
            Err(AppError::Validation(_))
        ));
    }
}
