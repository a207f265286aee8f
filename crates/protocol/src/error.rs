//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes on the wire.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// A line could not be parsed as a request or response.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The request was well-formed but named a method nobody implements.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The params object did not match what the method expects.
    #[error("invalid params for {method}: {reason}")]
    InvalidParams {
        /// Method whose params were rejected.
        method: String,
        /// Why the params were rejected.
        reason: String,
    },

    /// A line grew past the framing limit without a newline.
    #[error("line too long: exceeds maximum of {max} bytes")]
    LineTooLong {
        /// Maximum allowed line length.
        max: usize,
    },

    /// Failed to serialize an outgoing message.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Malformed(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}
