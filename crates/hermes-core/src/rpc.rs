//! JSON-RPC 2.0 wire envelopes.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

/// The protocol version carried by every envelope.
pub const VERSION: &str = "2.0";

/// An incoming request envelope.
///
/// `id` and `params` are kept raw so arbitrary JSON passes through
/// untouched; an absent or `null` id marks a notification.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version, `"2.0"`.
    #[serde(rename = "jsonrpc", default)]
    pub version: String,
    /// The request id echoed back in the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Box<RawValue>>,
    /// The endpoint key: `<system>/<method>.v<N>`.
    #[serde(default)]
    pub method: String,
    /// The raw params payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
}

impl RpcRequest {
    /// Builds a request envelope.
    #[must_use]
    pub fn new(id: Option<Box<RawValue>>, method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
        Self {
            version: VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// A notification expects no reply: its id is absent or `null`.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        match &self.id {
            None => true,
            Some(raw) => raw.get() == "null",
        }
    }

    /// The id as a JSON value, `null` when absent.
    #[must_use]
    pub fn id_value(&self) -> Value {
        self.id
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw.get()).ok())
            .unwrap_or(Value::Null)
    }
}

/// A successful reply envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResultResponse {
    /// Protocol version, `"2.0"`.
    pub jsonrpc: String,
    /// Echo of the request id.
    pub id: Value,
    /// The method result.
    pub result: Value,
}

impl RpcResultResponse {
    /// Builds a result envelope.
    #[must_use]
    pub fn new(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            id,
            result,
        }
    }
}

/// An error reply envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcErrorResponse {
    /// Protocol version, `"2.0"`.
    pub jsonrpc: String,
    /// Echo of the request id, `null` when the request could not be read.
    pub id: Value,
    /// The structured error.
    pub error: Error,
}

impl RpcErrorResponse {
    /// Builds an error envelope.
    #[must_use]
    pub fn new(id: Value, error: Error) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            id,
            error,
        }
    }
}

/// A server-initiated notification, pushed over websocket sessions.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcNotification {
    /// Protocol version, `"2.0"`.
    pub jsonrpc: String,
    /// The notification method.
    pub method: String,
    /// The notification payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcNotification {
    /// Builds a notification envelope. A payload that fails to serialize
    /// is dropped.
    #[must_use]
    pub fn new<P: Serialize>(method: impl Into<String>, payload: &P) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            method: method.into(),
            params: serde_json::to_value(payload).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_without_id_is_notification() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"sys/notify.v1"}"#).unwrap();
        assert!(request.is_notification());
        assert_eq!(request.id_value(), Value::Null);
    }

    #[test]
    fn test_request_with_null_id_is_notification() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"sys/notify.v1"}"#)
                .unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn test_request_with_id_is_a_call() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"7","method":"sys/echo.v1"}"#).unwrap();
        assert!(!request.is_notification());
        assert_eq!(request.id_value(), Value::String("7".to_string()));
    }

    #[test]
    fn test_request_id_passes_through_any_json() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":{"a":[1,2]},"method":"m"}"#).unwrap();
        assert_eq!(
            request.id_value(),
            serde_json::json!({"a": [1, 2]})
        );
    }

    #[test]
    fn test_result_response_shape() {
        let response = RpcResultResponse::new(
            Value::String("7".to_string()),
            serde_json::json!({"x": 1}),
        );
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":"7","result":{"x":1}}"#);
    }

    #[test]
    fn test_error_response_shape() {
        let response = RpcErrorResponse::new(Value::Null, Error::method_not_found());
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32601,"message":"Method not found"}}"#
        );
    }

    #[test]
    fn test_notification_shape() {
        let notification =
            RpcNotification::new("price/update.v1", &serde_json::json!({"symbol": "ETH"}));
        let json = serde_json::to_string(&notification).unwrap();
        assert_eq!(
            json,
            r#"{"jsonrpc":"2.0","method":"price/update.v1","params":{"symbol":"ETH"}}"#
        );
    }
}
