//! The fixed set of tool methods and their params/results.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// Methods understood by the proxy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    /// Type text into the shell.
    Type,
    /// Send a key chord such as `ctrl+c` or `enter`.
    SendKey,
    /// Read the terminal buffer as text.
    GetContent,
    /// Visible screen plus cursor and dimensions.
    TakeScreenshot,
    /// Start recording the raw output stream.
    StartRecording,
    /// Stop the active recording.
    StopRecording,
}

impl Method {
    /// Every method, in wire order.
    pub const ALL: [Method; 6] = [
        Method::Type,
        Method::SendKey,
        Method::GetContent,
        Method::TakeScreenshot,
        Method::StartRecording,
        Method::StopRecording,
    ];

    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Type => "type",
            Method::SendKey => "sendKey",
            Method::GetContent => "getContent",
            Method::TakeScreenshot => "takeScreenshot",
            Method::StartRecording => "startRecording",
            Method::StopRecording => "stopRecording",
        }
    }

    /// Deserialize params for this method. `null` is treated as `{}`.
    pub fn parse_params<T: DeserializeOwned>(self, params: Value) -> Result<T> {
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams {
            method: self.as_str().to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMethod(s.to_string()))
    }
}

/// Params for [`Method::Type`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeParams {
    /// Text written to the shell as-is.
    pub text: String,
    /// Press enter after the text.
    #[serde(default)]
    pub submit: bool,
}

/// Params for [`Method::SendKey`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendKeyParams {
    /// Key chord, e.g. `enter`, `ctrl+c`, `shift+tab`, `up`.
    pub key: String,
}

/// Params for [`Method::GetContent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetContentParams {
    /// Only return the current viewport instead of the full scrollback.
    #[serde(default)]
    pub visible_only: bool,
}

/// Params for [`Method::StartRecording`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingParams {
    /// Where to write the recording. The server picks a path when absent.
    #[serde(default)]
    pub path: Option<String>,
}

/// Generic acknowledgement for methods without a meaningful result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    /// Always true.
    pub ok: bool,
}

impl Ack {
    /// The acknowledgement value.
    pub const OK: Ack = Ack { ok: true };
}

/// Result of [`Method::GetContent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentResult {
    /// Newline-joined terminal text.
    pub content: String,
}

/// Zero-based cursor position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorPosition {
    /// Column.
    pub x: u16,
    /// Row within the viewport.
    pub y: u16,
}

/// Result of [`Method::TakeScreenshot`]: a flat snapshot of the viewport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Screenshot {
    /// Visible rows joined with newlines.
    pub content: String,
    /// Cursor position within the viewport.
    pub cursor: CursorPosition,
    /// Viewport width.
    pub cols: u16,
    /// Viewport height.
    pub rows: u16,
}

impl Screenshot {
    /// Render as plain text with a trailing status line.
    pub fn to_text(&self) -> String {
        format!(
            "{}\n\n[cursor {},{} | {}x{}]",
            self.content, self.cursor.x, self.cursor.y, self.cols, self.rows
        )
    }
}

/// Result of [`Method::StartRecording`] and [`Method::StopRecording`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingStatus {
    /// Whether a recording is active after the call.
    pub recording: bool,
    /// Path of the recording file.
    pub path: Option<String>,
    /// Bytes captured so far.
    pub bytes: u64,
}
