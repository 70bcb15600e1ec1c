//! JSON bodies carried inside encrypted miIO payloads.
//!
//! Requests are `{"id": ..., "method": ..., "params": [...]}`; responses are
//! either `{"id": ..., "result": ...}` or
//! `{"id": ..., "error": {"code": ..., "message": ...}}`. The response union
//! is a proper sum type, discriminated by which field the device sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A device method invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Correlation id, randomly generated per call
    pub id: u32,
    /// Device method name, e.g. `get_prop`
    pub method: String,
    /// Method parameters; devices expect an array, `[]` when absent
    pub params: Value,
}

impl Request {
    /// Builds a request, defaulting absent params to an empty array.
    pub fn new(id: u32, method: &str, params: Option<Value>) -> Self {
        Self {
            id,
            method: method.to_string(),
            params: params.unwrap_or_else(|| Value::Array(Vec::new())),
        }
    }
}

/// Error body of a failed device call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
}

/// A device reply, either a result or a device-reported error.
///
/// `Failure` is listed first so that a body carrying an `error` field never
/// falls through to the success variant during untagged deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Response {
    Failure { id: u32, error: ResponseError },
    Success { id: u32, result: Value },
}

impl Response {
    /// Correlation id echoed by the device.
    pub fn id(&self) -> u32 {
        match self {
            Response::Success { id, .. } => *id,
            Response::Failure { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_default_params() {
        let request = Request::new(7, "get_prop", None);
        let text = serde_json::to_string(&request).unwrap();
        assert_eq!(text, r#"{"id":7,"method":"get_prop","params":[]}"#);
    }

    #[test]
    fn success_response_parses() {
        let response: Response =
            serde_json::from_str(r#"{"id":42,"result":["on"]}"#).unwrap();
        assert_eq!(response.id(), 42);
        assert_eq!(
            response,
            Response::Success {
                id: 42,
                result: json!(["on"]),
            }
        );
    }

    #[test]
    fn error_response_parses() {
        let response: Response =
            serde_json::from_str(r#"{"id":42,"error":{"code":-9999,"message":"user ack timeout"}}"#)
                .unwrap();
        match response {
            Response::Failure { id, error } => {
                assert_eq!(id, 42);
                assert_eq!(error.code, -9999);
                assert_eq!(error.message, "user ack timeout");
            }
            Response::Success { .. } => panic!("expected failure variant"),
        }
    }
}
