//! JSON-RPC wire frames and the uniform session event type.

use super::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version carried in every outbound frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method enumerating a service's tools.
pub const TOOLS_LIST_METHOD: &str = "tools/list";

/// Method invoking a single tool.
pub const TOOLS_CALL_METHOD: &str = "tools/call";

/// Method used for best-effort liveness probes.
pub const PING_METHOD: &str = "ping";

/// Outbound call frame: `{jsonrpc, id, method, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version, always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Correlation identifier.
    pub id: RequestId,
    /// Remote method name.
    pub method: String,
    /// Method parameters.
    pub params: Value,
}

impl RpcRequest {
    /// Creates a request frame.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Error payload reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Remote error code.
    pub code: i64,
    /// Remote error message.
    pub message: String,
    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response frame matched to an outstanding call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Identifier of the call this response completes.
    pub id: RequestId,
    /// Remote result or remote-reported error.
    pub outcome: Result<Value, RpcError>,
}

impl RpcResponse {
    /// Creates a successful response.
    #[must_use]
    pub const fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Creates an error response.
    #[must_use]
    pub const fn failure(id: RequestId, error: RpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// A response carrying an id plus `result` or `error`.
    Response(RpcResponse),
    /// A message with a `method` and no response payload.
    Notification {
        /// Notification method.
        method: String,
        /// Notification parameters.
        params: Value,
    },
    /// Anything else; ignored by sessions.
    Unrecognized(Value),
}

impl InboundFrame {
    /// Classifies a decoded JSON value.
    ///
    /// Ids may arrive as numbers or numeric strings; any other id shape cannot
    /// match an outstanding call and yields [`Self::Unrecognized`].
    #[must_use]
    pub fn classify(value: Value) -> Self {
        let Value::Object(object) = value else {
            return Self::Unrecognized(value);
        };

        let carries_outcome = object.contains_key("result") || object.contains_key("error");
        if carries_outcome {
            return match object.get("id").and_then(parse_request_id) {
                Some(id) => Self::Response(response_from_object(id, &object)),
                None => Self::Unrecognized(Value::Object(object)),
            };
        }

        match object.get("method").and_then(Value::as_str) {
            Some(method) => Self::Notification {
                method: method.to_owned(),
                params: object.get("params").cloned().unwrap_or(Value::Null),
            },
            None => Self::Unrecognized(Value::Object(object)),
        }
    }
}

fn parse_request_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::Number(number) => number.as_u64().map(RequestId::new),
        Value::String(text) => text.trim().parse().ok().map(RequestId::new),
        _ => None,
    }
}

fn response_from_object(id: RequestId, object: &Map<String, Value>) -> RpcResponse {
    match object.get("error") {
        Some(error) if !error.is_null() => RpcResponse::failure(id, rpc_error_from(error)),
        _ => RpcResponse::success(id, object.get("result").cloned().unwrap_or(Value::Null)),
    }
}

fn rpc_error_from(value: &Value) -> RpcError {
    serde_json::from_value(value.clone()).unwrap_or_else(|_| RpcError {
        code: value.get("code").and_then(Value::as_i64).unwrap_or(-32_603),
        message: value
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| value.to_string(), str::to_owned),
        data: value.get("data").cloned(),
    })
}

/// Uniform event emitted by every transport session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An unsolicited message from the remote side.
    Notification {
        /// Notification method.
        method: String,
        /// Notification parameters.
        params: Value,
    },
    /// A non-fatal transport error (malformed frame, stream hiccup).
    Error {
        /// Error description.
        message: String,
    },
    /// The transport closed; no further events follow.
    Closed {
        /// Close reason.
        reason: String,
    },
}
