//! JSON-RPC 2.0 message types
//!
//! One JSON object per line. Requests carry a numeric or string `id`;
//! notifications omit it. Streaming handlers send `<method>.chunk`
//! notifications tagged with the originating request id before the final
//! response.

use fluorite_core::FluoriteError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::error::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, SERVICE_ERROR,
    UNAUTHORIZED,
};

pub const JSONRPC_VERSION: &str = "2.0";

/// Suffix appended to a method name for its stream notifications
pub const CHUNK_SUFFIX: &str = ".chunk";

/// JSON-RPC request or notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RpcId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Message identifier (number or string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Num(i64),
    Str(String),
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<RpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server-to-client notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: impl Into<RpcId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

impl From<i64> for RpcId {
    fn from(n: i64) -> Self {
        Self::Num(n)
    }
}

impl From<String> for RpcId {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for RpcId {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl RpcResponse {
    pub fn success(id: Option<RpcId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RpcId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Collapse into the handler outcome. A `null` result deserializes as
    /// `None` and comes back as `Value::Null`.
    pub fn into_result(self) -> std::result::Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(UNAUTHORIZED, "Unauthorized: call auth.login first")
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl From<FluoriteError> for RpcError {
    fn from(error: FluoriteError) -> Self {
        let mut data = json!({ "kind": error.kind() });
        if let FluoriteError::NotAuthenticated { env_var, .. } = &error {
            data["envVar"] = json!(env_var);
        }
        Self::new(SERVICE_ERROR, error.to_string()).with_data(data)
    }
}

impl RpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// Stream chunk for request `id` of `method`
    pub fn chunk(method: &str, id: &RpcId, data: Value) -> Self {
        Self::new(
            format!("{}{}", method, CHUNK_SUFFIX),
            json!({ "id": id, "data": data }),
        )
    }
}

/// A line received by the server that parsed as JSON
#[derive(Debug)]
pub enum Inbound {
    Request(RpcRequest),
    /// Valid JSON that is not a request; answered with `INVALID_REQUEST`
    Invalid { id: Option<RpcId>, reason: String },
}

/// Decode one server-side line. Only malformed JSON is an `Err`.
pub fn decode_request(line: &str) -> serde_json::Result<Inbound> {
    let value: Value = serde_json::from_str(line)?;
    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RpcId>(id.clone()).ok());

    if value.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Ok(Inbound::Invalid {
            id,
            reason: "jsonrpc must be \"2.0\"".to_string(),
        });
    }
    if !value.get("method").is_some_and(Value::is_string) {
        return Ok(Inbound::Invalid {
            id,
            reason: "method must be a string".to_string(),
        });
    }

    match serde_json::from_value::<RpcRequest>(value) {
        Ok(request) => Ok(Inbound::Request(request)),
        Err(e) => Ok(Inbound::Invalid {
            id,
            reason: e.to_string(),
        }),
    }
}

/// A line received by the client
#[derive(Debug)]
pub enum ServerMessage {
    Response(RpcResponse),
    Notification(RpcNotification),
}

/// Decode one client-side line into a response or notification
pub fn decode_server_message(line: &str) -> std::result::Result<ServerMessage, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;

    if value.get("method").is_some() {
        serde_json::from_value(value)
            .map(ServerMessage::Notification)
            .map_err(|e| e.to_string())
    } else if value.get("result").is_some() || value.get("error").is_some() {
        serde_json::from_value(value)
            .map(ServerMessage::Response)
            .map_err(|e| e.to_string())
    } else {
        Err("message is neither a response nor a notification".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request_ids() {
        let numeric = r#"{"jsonrpc":"2.0","id":42,"method":"system.ping"}"#;
        match decode_request(numeric).unwrap() {
            Inbound::Request(req) => {
                assert_eq!(req.id, Some(RpcId::Num(42)));
                assert!(req.params.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }

        let string = r#"{"jsonrpc":"2.0","id":"abc","method":"x","params":{"a":1}}"#;
        match decode_request(string).unwrap() {
            Inbound::Request(req) => {
                assert_eq!(req.id, Some(RpcId::Str("abc".to_string())));
                assert_eq!(req.params.unwrap()["a"], 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_request_invalid_keeps_id() {
        let missing_method = r#"{"jsonrpc":"2.0","id":7}"#;
        match decode_request(missing_method).unwrap() {
            Inbound::Invalid { id, .. } => assert_eq!(id, Some(RpcId::Num(7))),
            other => panic!("unexpected {:?}", other),
        }

        let wrong_version = r#"{"jsonrpc":"1.0","id":1,"method":"x"}"#;
        assert!(matches!(
            decode_request(wrong_version).unwrap(),
            Inbound::Invalid { .. }
        ));

        assert!(decode_request("{not json").is_err());
    }

    #[test]
    fn test_notification_omits_id() {
        let req = RpcRequest::notification("log", None);
        assert!(req.is_notification());
        let wire = serde_json::to_string(&req).unwrap();
        assert!(!wire.contains("\"id\""));
        assert!(!wire.contains("\"params\""));
    }

    #[test]
    fn test_null_result_round_trips_as_null() {
        let wire = serde_json::to_string(&RpcResponse::success(Some(RpcId::Num(1)), Value::Null))
            .unwrap();
        assert!(wire.contains("\"result\":null"));

        match decode_server_message(&wire).unwrap() {
            ServerMessage::Response(resp) => assert_eq!(resp.into_result().unwrap(), Value::Null),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_chunk_shape() {
        let chunk = RpcNotification::chunk("dashboard.watch", &RpcId::Num(3), json!({"n": 1}));
        let wire: Value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(wire["method"], "dashboard.watch.chunk");
        assert_eq!(wire["params"]["id"], 3);
        assert_eq!(wire["params"]["data"]["n"], 1);
    }

    #[test]
    fn test_service_error_carries_kind() {
        let error: RpcError = FluoriteError::NotAuthenticated {
            service: "vercel".to_string(),
            env_var: "VERCEL_TOKEN".to_string(),
        }
        .into();
        assert_eq!(error.code, SERVICE_ERROR);
        let data = error.data.unwrap();
        assert_eq!(data["kind"], "not_authenticated");
        assert_eq!(data["envVar"], "VERCEL_TOKEN");
    }

    #[test]
    fn test_decode_server_message_rejects_requests() {
        let line = r#"{"jsonrpc":"2.0","id":1}"#;
        assert!(decode_server_message(line).is_err());
    }
}
