//! # ShellBridge Protocol Library
//!
//! Wire types shared by every process that talks to a shellbridge session.
//!
//! ## Overview
//!
//! - **Envelopes**: `{id, method, params}` requests and `{id, result|error}` responses
//! - **Methods**: the fixed tool set (`type`, `sendKey`, `getContent`, ...)
//!   with typed params and results
//! - **Framing**: newline-delimited JSON with partial-read buffering
//! - **Embedded messages**: the stdio control protocol used by host applications
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   proxy socket (NDJSON)   ┌──────────────────────┐
//! │ MCP bridge / │ ────────────────────────▶ │ interactive instance │
//! │ ProxyClient  │ ◀──────────────────────── │ (owns the session)   │
//! └──────────────┘                           └──────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use shellbridge_protocol::{encode_line, LineBuffer, Method, Request, TypeParams};
//!
//! let request = Request::new(
//!     1,
//!     Method::Type,
//!     &TypeParams { text: "echo hi".to_string(), submit: true },
//! )
//! .unwrap();
//! let bytes = encode_line(&request).unwrap();
//!
//! let mut buffer = LineBuffer::new();
//! buffer.extend(&bytes);
//! let line = buffer.next_line().unwrap().unwrap();
//! assert!(line.contains("\"method\":\"type\""));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Request/response envelopes
//! - [`methods`]: Method set, params and results
//! - [`framing`]: Line buffering and encoding
//! - [`embedded`]: Embedded-mode control messages
//! - [`error`]: Error types

pub mod embedded;
pub mod error;
pub mod framing;
pub mod messages;
pub mod methods;

pub use embedded::{decode_command, EmbeddedCommand, EmbeddedEvent};
pub use error::{ProtocolError, Result};
pub use framing::{encode_line, LineBuffer, MAX_LINE_LENGTH};
pub use messages::{
    decode_request, decode_response, DecodeError, ErrorBody, Request, RequestId, Response,
};
pub use methods::{
    Ack, ContentResult, CursorPosition, GetContentParams, Method, RecordingStatus, Screenshot,
    SendKeyParams, StartRecordingParams, TypeParams,
};
