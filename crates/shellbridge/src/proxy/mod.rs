//! Unix-socket tool proxy.
//!
//! The interactive instance that owns the session listens on a local socket
//! so a detached client (the MCP bridge) can drive the same shell.
//!
//! ## Overview
//!
//! The proxy uses newline-delimited JSON: one `{id, method, params}` request
//! per line, answered in order with `{id, result}` or `{id, error}`. Only one
//! client is served at a time; a new connection evicts the previous one.
//!
//! The server remembers the identity of the socket file it bound. If another
//! instance later binds the same path, the first one notices on its next
//! poll, drops its client and goes quiet instead of fighting for the path.
//!
//! ## Socket Path
//!
//! - Primary: `$XDG_RUNTIME_DIR/shellbridge/proxy.sock`
//! - Fallback: `/tmp/shellbridge-$UID/proxy.sock`
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shellbridge::proxy::{default_socket_path, ProxyClient, ProxyServer, ServerOptions};
//! use shellbridge::proxy::dispatch::SessionToolHandler;
//! use shellbridge::session::SessionManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Arc::new(SessionManager::new("/tmp/recordings"));
//! let path = default_socket_path();
//! let server = ProxyServer::bind(
//!     &path,
//!     Arc::new(SessionToolHandler::new(manager)),
//!     ServerOptions::default(),
//! )
//! .await?;
//!
//! let mut client = ProxyClient::connect(&path).await?;
//! client.type_text("ls", true).await?;
//! println!("{}", client.get_content(true).await?);
//!
//! server.close().await;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod dispatch;
pub mod ownership;
mod server;

pub use client::ProxyClient;
pub use dispatch::{DispatchError, RequestHandler, SessionToolHandler};
pub use ownership::{probe, Ownership, OwnershipToken, SocketProbe};
pub use server::{ProxyServer, ServerOptions};

use std::io;
use std::path::{Path, PathBuf};

use shellbridge_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur talking to the proxy socket.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A JSON serialization/deserialization error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer sent something that is not a valid envelope.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Nothing is listening on the socket.
    #[error("no terminal session available at {}", path.display())]
    NoSession {
        /// Socket path that was tried.
        path: PathBuf,
    },

    /// The server answered with an error envelope.
    #[error("{message}")]
    Remote {
        /// Message from the server.
        message: String,
    },

    /// Writing the request failed, so the server never saw it.
    #[error("request not delivered: {0}")]
    Undelivered(#[source] io::Error),

    /// The server did not answer in time.
    #[error("operation timed out")]
    Timeout,

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,
}

impl ProxyError {
    /// Whether the connection is gone.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProxyError::Closed | ProxyError::Undelivered(_) | ProxyError::NoSession { .. } => true,
            ProxyError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Whether the request certainly never reached the server, so sending it
    /// again cannot run it twice.
    pub fn is_undelivered(&self) -> bool {
        matches!(
            self,
            ProxyError::Undelivered(_) | ProxyError::NoSession { .. }
        )
    }

    /// Map a connect failure, turning "nobody is listening" into `NoSession`.
    pub(crate) fn from_connect(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => ProxyError::NoSession {
                path: path.to_path_buf(),
            },
            _ => ProxyError::Io(err),
        }
    }
}

/// Get the socket path for the tool proxy.
///
/// 1. If `$XDG_RUNTIME_DIR` is set: `$XDG_RUNTIME_DIR/shellbridge/proxy.sock`
/// 2. Otherwise: `/tmp/shellbridge-$UID/proxy.sock`
pub fn default_socket_path() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(runtime_dir) if !runtime_dir.is_empty() => PathBuf::from(runtime_dir)
            .join("shellbridge")
            .join("proxy.sock"),
        _ => {
            let uid = nix::unistd::getuid();
            PathBuf::from(format!("/tmp/shellbridge-{uid}")).join("proxy.sock")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_runtime_dir<F: FnOnce()>(value: Option<&str>, f: F) {
        let original = std::env::var("XDG_RUNTIME_DIR").ok();
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            match value {
                Some(v) => std::env::set_var("XDG_RUNTIME_DIR", v),
                None => std::env::remove_var("XDG_RUNTIME_DIR"),
            }
        }
        f();
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            match original {
                Some(v) => std::env::set_var("XDG_RUNTIME_DIR", v),
                None => std::env::remove_var("XDG_RUNTIME_DIR"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_socket_path_with_xdg_runtime_dir() {
        with_runtime_dir(Some("/run/user/1000"), || {
            assert_eq!(
                default_socket_path(),
                PathBuf::from("/run/user/1000/shellbridge/proxy.sock")
            );
        });
    }

    #[test]
    #[serial]
    fn test_socket_path_without_xdg_runtime_dir() {
        with_runtime_dir(None, || {
            let path = default_socket_path();
            let text = path.to_str().unwrap();
            assert!(text.starts_with("/tmp/shellbridge-"));
            assert!(text.ends_with("/proxy.sock"));
        });
    }

    #[test]
    fn test_connect_errors_map_to_no_session() {
        let path = Path::new("/tmp/nowhere.sock");
        let err = ProxyError::from_connect(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ProxyError::NoSession { .. }));
        assert!(err.to_string().contains("no terminal session available"));

        let err = ProxyError::from_connect(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, ProxyError::Io(_)));
    }
}
