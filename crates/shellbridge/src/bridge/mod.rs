//! Detached client bridge.
//!
//! Speaks MCP on stdio and forwards each tool call to the proxy socket of the
//! instance that owns the session. No session is created here.

pub mod mcp;
pub mod tools;

pub use mcp::{JsonRpcError, JsonRpcResponse, McpServer, ProxyBackend, ToolBackend, PROTOCOL_VERSION};
pub use tools::{Tool, TOOLS};

use std::path::Path;
use std::time::Duration;

use tokio::io::BufReader;

/// Serve MCP on stdin/stdout until stdin closes.
pub async fn run_stdio(socket_path: &Path, timeout: Duration) -> std::io::Result<()> {
    tracing::info!(socket = %socket_path.display(), "Starting MCP bridge");
    let mut server = McpServer::new(ProxyBackend::new(socket_path, timeout));
    server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}
