//! JSON-RPC 2.0 / MCP server over stdio.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shellbridge_protocol::Method;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::tools::{self, TOOLS};
use crate::proxy::{ProxyClient, ProxyError};

/// MCP revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// One JSON-RPC response line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Where tool calls are sent.
#[async_trait]
pub trait ToolBackend: Send {
    async fn call(&mut self, method: Method, params: Value) -> Result<Value, ProxyError>;
}

/// Forwards tool calls to the proxy socket.
///
/// The connection is opened on first use. A call is sent again on a fresh
/// connection only when writing it failed; once the request may have
/// reached the server it is never repeated.
pub struct ProxyBackend {
    path: PathBuf,
    timeout: Duration,
    client: Option<ProxyClient>,
}

impl ProxyBackend {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            client: None,
        }
    }

    async fn ensure_connected(&mut self) -> Result<&mut ProxyClient, ProxyError> {
        if self.client.is_none() {
            let client = ProxyClient::connect_with_timeout(&self.path, self.timeout).await?;
            self.client = Some(client);
        }
        self.client.as_mut().ok_or(ProxyError::Closed)
    }
}

#[async_trait]
impl ToolBackend for ProxyBackend {
    async fn call(&mut self, method: Method, params: Value) -> Result<Value, ProxyError> {
        let mut retried = false;
        loop {
            let client = self.ensure_connected().await?;
            match client.call(method, &params).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_undelivered() && !retried => {
                    self.client = None;
                    tracing::debug!(error = %e, "Proxy connection lost, reconnecting");
                    retried = true;
                }
                Err(e) => {
                    // A timed-out read may have left half a line buffered.
                    if e.is_disconnect() || matches!(e, ProxyError::Timeout) {
                        self.client = None;
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// MCP server exposing the terminal tools.
pub struct McpServer<B> {
    backend: B,
    initialized: bool,
}

impl<B: ToolBackend> McpServer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            initialized: false,
        }
    }

    /// Serve until `reader` reaches end of input.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut bytes = serde_json::to_vec(&response)?;
            bytes.push(b'\n');
            writer.write_all(&bytes).await?;
            writer.flush().await?;
        }
        tracing::info!("MCP input closed");
        Ok(())
    }

    /// Handle one input line. Notifications produce no response.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable MCP message");
                let code = if serde_json::from_str::<Value>(line).is_ok() {
                    INVALID_REQUEST
                } else {
                    PARSE_ERROR
                };
                return Some(JsonRpcResponse::failure(Value::Null, code, e.to_string()));
            }
        };

        if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
            tracing::debug!(version = ?request.jsonrpc, "Unexpected JSON-RPC version");
        }

        let Some(id) = request.id else {
            self.handle_notification(&request.method);
            return None;
        };

        let params = request.params.unwrap_or(Value::Null);
        Some(match self.handle_request(&request.method, params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id,
                result: None,
                error: Some(error),
            },
        })
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "notifications/initialized" => {
                self.initialized = true;
                tracing::info!("MCP client initialized");
            }
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    async fn handle_request(&mut self, method: &str, params: Value) -> Result<Value, JsonRpcError> {
        tracing::debug!(method, "MCP request");
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "shellbridge",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            "ping" => Ok(json!({})),
            "tools/list" => {
                let tools: Vec<Value> = TOOLS.iter().map(|tool| tool.describe()).collect();
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => self.call_tool(params).await,
            other => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {other}"),
            }),
        }
    }

    async fn call_tool(&mut self, params: Value) -> Result<Value, JsonRpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError {
                code: INVALID_PARAMS,
                message: "Missing 'name' parameter in tools/call".to_string(),
            })?;
        let tool = tools::lookup(name).ok_or_else(|| JsonRpcError {
            code: INVALID_PARAMS,
            message: format!("Unknown tool: {name}"),
        })?;

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let proxy_params = match tool.params(arguments) {
            Ok(params) => params,
            Err(message) => return Ok(tool_result(message, true)),
        };

        match self.backend.call(tool.method, proxy_params).await {
            Ok(result) => Ok(tool_result(tool.render(result), false)),
            Err(e) => {
                tracing::warn!(tool = tool.name, error = %e, "Tool call failed");
                Ok(tool_result(tools::render_error(&e), true))
            }
        }
    }
}

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": is_error
    })
}
