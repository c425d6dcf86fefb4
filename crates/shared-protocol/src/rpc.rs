//! JSON-RPC 2.0 message model
//!
//! Messages are classified by which members are present rather than by a
//! tagged representation: a `method` makes a request (with `id`) or a
//! notification (without), an `id` without `method` makes a response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{JSONRPC_VERSION, ProtocolError, ProtocolResult};

/// Method not found
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters
pub const INVALID_PARAMS: i64 = -32602;
/// Internal error
pub const INTERNAL_ERROR: i64 = -32603;
/// The streaming software refused or failed the operation
pub const SOFTWARE_FAILURE: i64 = 0;

/// A single JSON-RPC message
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    Request {
        id: String,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    SuccessResponse {
        id: String,
        result: Value,
    },
    ErrorResponse {
        id: String,
        error: RpcErrorObject,
    },
}

/// The `error` member of an error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(reason: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {reason}"))
    }

    pub fn software_failure(message: impl Into<String>) -> Self {
        Self::new(SOFTWARE_FAILURE, message)
    }

    /// Build from an arbitrary `error` value, keeping the raw value as data
    /// when it does not have the usual shape.
    fn from_value(value: Value) -> Self {
        match serde_json::from_value::<RpcErrorObject>(value.clone()) {
            Ok(error) => error,
            Err(_) => Self {
                code: SOFTWARE_FAILURE,
                message: value.to_string(),
                data: Some(value),
            },
        }
    }
}

impl std::fmt::Display for RpcErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl RpcMessage {
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self::SuccessResponse {
            id: id.into(),
            result,
        }
    }

    pub fn error(id: impl Into<String>, error: RpcErrorObject) -> Self {
        Self::ErrorResponse {
            id: id.into(),
            error,
        }
    }

    /// The method name for requests and notifications
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            _ => None,
        }
    }

    /// The id for requests and responses
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Request { id, .. }
            | Self::SuccessResponse { id, .. }
            | Self::ErrorResponse { id, .. } => Some(id),
            Self::Notification { .. } => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Request { id, method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "method": method,
                "params": params,
            }),
            Self::Notification { method, params } => {
                let mut obj = Map::new();
                obj.insert("jsonrpc".into(), JSONRPC_VERSION.into());
                obj.insert("method".into(), method.as_str().into());
                if let Some(params) = params {
                    obj.insert("params".into(), params.clone());
                }
                Value::Object(obj)
            }
            Self::SuccessResponse { id, result } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "result": result,
            }),
            Self::ErrorResponse { id, error } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "error": error,
            }),
        }
    }

    /// Serialize to the bytes carried in one encrypted frame
    pub fn to_vec(&self) -> Vec<u8> {
        self.to_value().to_string().into_bytes()
    }

    pub fn from_slice(data: &[u8]) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_slice(data)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let Value::Object(mut obj) = value else {
            return Err(ProtocolError::InvalidShape("message is not an object"));
        };

        match obj.get("jsonrpc") {
            Some(Value::String(version)) if version == JSONRPC_VERSION => {}
            Some(other) => return Err(ProtocolError::InvalidVersion(other.to_string())),
            None => return Err(ProtocolError::InvalidVersion("missing".into())),
        }

        let id = obj.remove("id").map(parse_id).transpose()?;

        if let Some(method) = obj.remove("method") {
            let Value::String(method) = method else {
                return Err(ProtocolError::InvalidShape("method is not a string"));
            };
            let params = obj.remove("params");
            return Ok(match id {
                Some(id) => Self::Request {
                    id,
                    method,
                    params: params.unwrap_or(Value::Null),
                },
                None => Self::Notification { method, params },
            });
        }

        let Some(id) = id else {
            return Err(ProtocolError::InvalidShape("neither method nor id present"));
        };

        if let Some(result) = obj.remove("result") {
            return Ok(Self::SuccessResponse { id, result });
        }
        if let Some(error) = obj.remove("error") {
            return Ok(Self::ErrorResponse {
                id,
                error: RpcErrorObject::from_value(error),
            });
        }

        Err(ProtocolError::InvalidShape(
            "response has neither result nor error",
        ))
    }
}

/// Ids are strings on the wire; numeric ids from lenient peers are
/// accepted in their decimal form.
fn parse_id(value: Value) -> ProtocolResult<String> {
    match value {
        Value::String(id) if !id.is_empty() => Ok(id),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ProtocolError::InvalidId(other.to_string())),
    }
}
