//! Request/response envelope exchanged over the method channel.
//!
//! Every request carries a caller-chosen `id`; exactly one response with the
//! same `id` is delivered for it.  There is no streaming: a discovery call
//! resolves once with the complete device list.
//!
//! ```json
//! → {"id": 7, "method": "connect", "args": {"interfaceType": "tcp", "identifier": "10.0.0.5"}}
//! ← {"id": 7, "result": {"status": "success", "value": true}}
//! ← {"id": 8, "result": {"status": "error", "code": "NOT_CONNECTED", "message": "no active connection"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::codes::ErrorCode;

/// A named operation requested by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub id: u64,
    pub method: String,
    /// Operation arguments; `null` when the operation takes none.
    #[serde(default)]
    pub args: Value,
}

impl MethodCall {
    pub fn new(id: u64, method: impl Into<String>, args: Value) -> Self {
        Self {
            id,
            method: method.into(),
            args,
        }
    }
}

/// Outcome of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MethodResult {
    Success { value: Value },
    Error { code: ErrorCode, message: String },
}

impl MethodResult {
    /// Serialises `value` into a success result.
    ///
    /// A value that cannot be represented as JSON becomes `INTERNAL_ERROR`.
    pub fn success<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => MethodResult::Success { value },
            Err(e) => MethodResult::error(ErrorCode::InternalError, e.to_string()),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        MethodResult::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResult::Success { .. })
    }

    /// The error code, if this is an error result.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            MethodResult::Error { code, .. } => Some(*code),
            MethodResult::Success { .. } => None,
        }
    }

    /// The success payload, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            MethodResult::Success { value } => Some(value),
            MethodResult::Error { .. } => None,
        }
    }
}

/// A result correlated back to the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResponse {
    pub id: u64,
    pub result: MethodResult,
}

impl MethodResponse {
    pub fn new(id: u64, result: MethodResult) -> Self {
        Self { id, result }
    }
}
