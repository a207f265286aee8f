//! Request/response envelopes for the proxy socket.
//!
//! Every message is a single JSON object on its own line:
//!
//! ```text
//! → {"id": 1, "method": "getContent", "params": {}}
//! ← {"id": 1, "result": {"content": "$ echo hi\nhi\n$"}}
//! ← {"id": 2, "error": {"message": "unknown method: frobnicate"}}
//! ```
//!
//! The `id` is assigned by the caller and echoed back verbatim. An envelope
//! has no meaning outside the connection it arrived on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::methods::Method;

/// Caller-assigned request identifier.
pub type RequestId = i64;

/// A request sent to the proxy server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Identifier echoed back in the response.
    pub id: RequestId,
    /// Method name, see [`Method`].
    pub method: String,
    /// Method parameters. Missing params are treated as `{}`.
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Build a request for a known method with typed params.
    pub fn new<P: Serialize>(id: RequestId, method: Method, params: &P) -> Result<Self> {
        let params = serde_json::to_value(params)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        Ok(Self {
            id,
            method: method.as_str().to_string(),
            params,
        })
    }

    /// Resolve the method name against the known method set.
    pub fn method(&self) -> Result<Method> {
        self.method.parse()
    }
}

/// Error payload carried by a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub message: String,
}

/// A response from the proxy server.
///
/// Exactly one of `result` and `error` is present on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Identifier of the request being answered.
    pub id: RequestId,
    /// Successful result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// Build a successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build a failed response.
    pub fn failure(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody {
                message: message.into(),
            }),
        }
    }

    /// Returns true if this response carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Convert into a plain `Result`, mapping a JSON `null` result to `Value::Null`.
    pub fn into_result(self) -> std::result::Result<Value, ErrorBody> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A line that could not be turned into a [`Request`].
///
/// `id` is set when the line was a JSON object with an integer `id`, so the
/// server can still answer with an error envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    /// Salvaged request id, if any.
    pub id: Option<RequestId>,
    /// What went wrong.
    pub error: ProtocolError,
}

/// Decode one line into a request, salvaging the id on failure where possible.
pub fn decode_request(line: &str) -> std::result::Result<Request, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(|e| DecodeError {
        id: None,
        error: ProtocolError::Malformed(e.to_string()),
    })?;

    let id = value.get("id").and_then(Value::as_i64);

    serde_json::from_value(value).map_err(|e| DecodeError {
        id,
        error: ProtocolError::Malformed(e.to_string()),
    })
}

/// Decode one line into a response.
pub fn decode_response(line: &str) -> Result<Response> {
    Ok(serde_json::from_str(line)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::TypeParams;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = Request::new(
            7,
            Method::Type,
            &TypeParams {
                text: "ls".to_string(),
                submit: true,
            },
        )
        .unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({"id": 7, "method": "type", "params": {"text": "ls", "submit": true}})
        );
    }

    #[test]
    fn test_request_missing_params_defaults_to_null() {
        let request = decode_request(r#"{"id":3,"method":"getContent"}"#).unwrap();
        assert_eq!(request.id, 3);
        assert_eq!(request.params, Value::Null);
        assert_eq!(request.method().unwrap(), Method::GetContent);
    }

    #[test]
    fn test_decode_non_json_has_no_id() {
        let err = decode_request("hello there").unwrap_err();
        assert_eq!(err.id, None);
        assert!(matches!(err.error, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_salvages_id_when_method_missing() {
        let err = decode_request(r#"{"id":42,"params":{}}"#).unwrap_err();
        assert_eq!(err.id, Some(42));
    }

    #[test]
    fn test_decode_ignores_non_integer_id() {
        let err = decode_request(r#"{"id":"abc"}"#).unwrap_err();
        assert_eq!(err.id, None);
    }

    #[test]
    fn test_success_response_shape() {
        let response = Response::success(1, json!({"content": "hi"}));
        let line = serde_json::to_string(&response).unwrap();
        assert_eq!(line, r#"{"id":1,"result":{"content":"hi"}}"#);
    }

    #[test]
    fn test_null_result_is_still_serialized() {
        let response = Response::success(5, Value::Null);
        let line = serde_json::to_string(&response).unwrap();
        assert_eq!(line, r#"{"id":5,"result":null}"#);

        let decoded = decode_response(&line).unwrap();
        assert_eq!(decoded.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_failure_response_shape() {
        let response = Response::failure(9, "session disposed");
        let line = serde_json::to_string(&response).unwrap();
        assert_eq!(line, r#"{"id":9,"error":{"message":"session disposed"}}"#);

        let decoded = decode_response(&line).unwrap();
        assert!(decoded.is_error());
        assert_eq!(decoded.into_result().unwrap_err().message, "session disposed");
    }
}
