//! MCP tool catalog.
//!
//! Each tool maps onto one proxy method. Tool arguments use snake_case and
//! are translated into the proxy's params before forwarding.

use serde::Deserialize;
use serde_json::{json, Value};
use shellbridge_protocol::{
    ContentResult, GetContentParams, Method, RecordingStatus, Screenshot, SendKeyParams,
    StartRecordingParams, TypeParams,
};

use crate::proxy::ProxyError;

/// One tool exposed over MCP.
#[derive(Debug, Clone, Copy)]
pub struct Tool {
    pub name: &'static str,
    pub description: &'static str,
    pub method: Method,
}

pub static TOOLS: [Tool; 6] = [
    Tool {
        name: "terminal_type",
        description: "Type text into the user's shared terminal. Set submit to press Enter afterwards.",
        method: Method::Type,
    },
    Tool {
        name: "terminal_send_key",
        description: "Send a key or chord to the terminal, e.g. enter, ctrl+c, up, shift+tab, f5.",
        method: Method::SendKey,
    },
    Tool {
        name: "terminal_get_content",
        description: "Read the terminal text, including scrollback unless visible_only is set.",
        method: Method::GetContent,
    },
    Tool {
        name: "terminal_screenshot",
        description: "Capture the visible screen with cursor position and size.",
        method: Method::TakeScreenshot,
    },
    Tool {
        name: "terminal_start_recording",
        description: "Start recording raw terminal output to a file.",
        method: Method::StartRecording,
    },
    Tool {
        name: "terminal_stop_recording",
        description: "Stop the active recording and report where it was written.",
        method: Method::StopRecording,
    },
];

/// Find a tool by name.
pub fn lookup(name: &str) -> Option<&'static Tool> {
    TOOLS.iter().find(|tool| tool.name == name)
}

impl Tool {
    /// JSON Schema of the tool's arguments.
    pub fn input_schema(&self) -> Value {
        match self.method {
            Method::Type => json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to type"},
                    "submit": {"type": "boolean", "description": "Press Enter after typing", "default": false}
                },
                "required": ["text"]
            }),
            Method::SendKey => json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Key name or chord such as ctrl+c"}
                },
                "required": ["key"]
            }),
            Method::GetContent => json!({
                "type": "object",
                "properties": {
                    "visible_only": {"type": "boolean", "description": "Only the current screen", "default": false}
                }
            }),
            Method::StartRecording => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Output file; chosen automatically when omitted"}
                }
            }),
            Method::TakeScreenshot | Method::StopRecording => json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    /// Entry for a `tools/list` result.
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }

    /// Translate MCP arguments into proxy params.
    pub fn params(&self, arguments: Value) -> Result<Value, String> {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        let invalid = |e: serde_json::Error| format!("invalid arguments for {}: {e}", self.name);

        let params = match self.method {
            Method::Type => {
                let args: TypeArgs = serde_json::from_value(arguments).map_err(invalid)?;
                serde_json::to_value(TypeParams {
                    text: args.text,
                    submit: args.submit,
                })
            }
            Method::SendKey => {
                let args: SendKeyArgs = serde_json::from_value(arguments).map_err(invalid)?;
                serde_json::to_value(SendKeyParams { key: args.key })
            }
            Method::GetContent => {
                let args: GetContentArgs = serde_json::from_value(arguments).map_err(invalid)?;
                serde_json::to_value(GetContentParams {
                    visible_only: args.visible_only,
                })
            }
            Method::StartRecording => {
                let args: StartRecordingArgs =
                    serde_json::from_value(arguments).map_err(invalid)?;
                serde_json::to_value(StartRecordingParams { path: args.path })
            }
            Method::TakeScreenshot | Method::StopRecording => Ok(json!({})),
        };
        params.map_err(|e| e.to_string())
    }

    /// Render a proxy result as tool output text.
    pub fn render(&self, result: Value) -> String {
        match self.method {
            Method::Type | Method::SendKey => "ok".to_string(),
            Method::GetContent => match serde_json::from_value::<ContentResult>(result.clone()) {
                Ok(content) => content.content,
                Err(_) => result.to_string(),
            },
            Method::TakeScreenshot => match serde_json::from_value::<Screenshot>(result.clone()) {
                Ok(shot) => shot.to_text(),
                Err(_) => result.to_string(),
            },
            Method::StartRecording | Method::StopRecording => {
                match serde_json::from_value::<RecordingStatus>(result.clone()) {
                    Ok(status) => render_recording(&status),
                    Err(_) => result.to_string(),
                }
            }
        }
    }
}

fn render_recording(status: &RecordingStatus) -> String {
    let path = status.path.as_deref().unwrap_or("(no file)");
    if status.recording {
        format!("Recording to {path}")
    } else {
        format!("Recording stopped: {path} ({} bytes)", status.bytes)
    }
}

/// Text shown to the assistant when a tool call fails.
pub fn render_error(err: &ProxyError) -> String {
    match err {
        ProxyError::NoSession { .. } => format!(
            "{err}. Start shellbridge in a terminal first, then retry this tool."
        ),
        ProxyError::Remote { message } => message.clone(),
        other => format!("terminal proxy error: {other}"),
    }
}

#[derive(Deserialize)]
struct TypeArgs {
    text: String,
    #[serde(default)]
    submit: bool,
}

#[derive(Deserialize)]
struct SendKeyArgs {
    key: String,
}

#[derive(Deserialize)]
struct GetContentArgs {
    #[serde(default, alias = "visibleOnly")]
    visible_only: bool,
}

#[derive(Deserialize)]
struct StartRecordingArgs {
    #[serde(default)]
    path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_every_method_has_a_tool() {
        for method in Method::ALL {
            assert!(TOOLS.iter().any(|tool| tool.method == method), "{method}");
        }
        assert_eq!(lookup("terminal_type").unwrap().method, Method::Type);
        assert!(lookup("terminal_launch").is_none());
    }

    #[test]
    fn test_get_content_arguments_are_translated() {
        let tool = lookup("terminal_get_content").unwrap();
        assert_eq!(
            tool.params(json!({"visible_only": true})).unwrap(),
            json!({"visibleOnly": true})
        );
        assert_eq!(tool.params(Value::Null).unwrap(), json!({"visibleOnly": false}));
    }

    #[test]
    fn test_missing_required_argument() {
        let tool = lookup("terminal_send_key").unwrap();
        let err = tool.params(json!({})).unwrap_err();
        assert!(err.contains("terminal_send_key"));
    }

    #[test]
    fn test_render_results() {
        let shot = lookup("terminal_screenshot").unwrap();
        let text = shot.render(json!({
            "content": "$ ls",
            "cursor": {"x": 4, "y": 0},
            "cols": 80,
            "rows": 24
        }));
        assert!(text.starts_with("$ ls"));
        assert!(text.contains("80x24"));

        let stop = lookup("terminal_stop_recording").unwrap();
        let text = stop.render(json!({"recording": false, "path": "/tmp/a.raw", "bytes": 12}));
        assert_eq!(text, "Recording stopped: /tmp/a.raw (12 bytes)");
    }

    #[test]
    fn test_render_no_session_error() {
        let err = ProxyError::NoSession {
            path: PathBuf::from("/tmp/proxy.sock"),
        };
        let text = render_error(&err);
        assert!(text.starts_with("no terminal session available at /tmp/proxy.sock"));
    }
}
