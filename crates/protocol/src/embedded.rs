//! Session-control messages for the embedded posture.
//!
//! A host application that launches shellbridge with `--embedded` talks to
//! it over stdin/stdout with one JSON object per line, tagged by `type`.
//! Raw terminal output is base64-encoded so arbitrary bytes survive JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::messages::{RequestId, Response};

/// Messages from the host to the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EmbeddedCommand {
    /// Write text to the shell verbatim.
    Input {
        /// Text to write.
        data: String,
    },
    /// Resize the terminal.
    Resize {
        /// New width.
        cols: u16,
        /// New height.
        rows: u16,
    },
    /// Invoke a tool method; answered with [`EmbeddedEvent::Response`].
    Request {
        /// Caller-assigned id.
        id: RequestId,
        /// Method name.
        method: String,
        /// Method params.
        #[serde(default)]
        params: Value,
    },
    /// Tear the session down and exit.
    Dispose,
}

/// Messages from the session to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EmbeddedEvent {
    /// The session is up.
    Ready {
        /// Session identifier.
        session_id: String,
        /// Shell process id, when known.
        pid: Option<u32>,
        /// Terminal width.
        cols: u16,
        /// Terminal height.
        rows: u16,
    },
    /// Raw output from the shell, base64-encoded.
    Output {
        /// Base64 of the raw bytes.
        data: String,
    },
    /// The terminal was resized.
    Resize {
        /// New width.
        cols: u16,
        /// New height.
        rows: u16,
    },
    /// Answer to an [`EmbeddedCommand::Request`].
    Response(Response),
    /// The shell exited or the session was disposed.
    Exit {
        /// Exit code, absent when the process was killed.
        code: Option<i32>,
    },
    /// A command line could not be understood.
    Error {
        /// What went wrong.
        message: String,
    },
}

impl EmbeddedEvent {
    /// Build an output event from raw bytes.
    pub fn output(bytes: &[u8]) -> Self {
        EmbeddedEvent::Output {
            data: STANDARD.encode(bytes),
        }
    }

    /// Decode the payload of an output event.
    pub fn output_bytes(&self) -> Option<Result<Vec<u8>>> {
        match self {
            EmbeddedEvent::Output { data } => Some(
                STANDARD
                    .decode(data)
                    .map_err(|e| ProtocolError::Malformed(e.to_string())),
            ),
            _ => None,
        }
    }
}

/// Parse one line from the host.
pub fn decode_command(line: &str) -> Result<EmbeddedCommand> {
    Ok(serde_json::from_str(line)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_command_wire_shape() {
        let cmd = decode_command(r#"{"type":"input","data":"ls\r"}"#).unwrap();
        assert_eq!(
            cmd,
            EmbeddedCommand::Input {
                data: "ls\r".to_string()
            }
        );
    }

    #[test]
    fn test_dispose_command() {
        assert_eq!(
            decode_command(r#"{"type":"dispose"}"#).unwrap(),
            EmbeddedCommand::Dispose
        );
    }

    #[test]
    fn test_request_command_without_params() {
        let cmd = decode_command(r#"{"type":"request","id":4,"method":"getContent"}"#).unwrap();
        match cmd {
            EmbeddedCommand::Request { id, method, params } => {
                assert_eq!(id, 4);
                assert_eq!(method, "getContent");
                assert!(params.is_null());
            }
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_type_is_malformed() {
        let err = decode_command(r#"{"type":"explode"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_output_event_base64() {
        let event = EmbeddedEvent::output(b"\x1b[1mhi\x1b[0m");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "output");
        assert_eq!(
            event.output_bytes().unwrap().unwrap(),
            b"\x1b[1mhi\x1b[0m".to_vec()
        );
    }

    #[test]
    fn test_response_event_is_flattened() {
        let event = EmbeddedEvent::Response(Response::success(2, json!({"ok": true})));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({"type": "response", "id": 2, "result": {"ok": true}})
        );
    }

    #[test]
    fn test_ready_event_uses_camel_case() {
        let event = EmbeddedEvent::Ready {
            session_id: "abc".to_string(),
            pid: Some(10),
            cols: 80,
            rows: 24,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sessionId"], "abc");
    }
}
