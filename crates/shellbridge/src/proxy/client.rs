//! Proxy client for driving a session owned by another process.
//!
//! Requests are sent one at a time and answered in order, so the client keeps
//! a single buffered reader and a monotonically increasing request id.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shellbridge_protocol::{
    decode_response, encode_line, ContentResult, GetContentParams, Method, RecordingStatus,
    Request, RequestId, Screenshot, SendKeyParams, StartRecordingParams, TypeParams,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use super::ProxyError;

/// Default timeout for client operations in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// A connection to a [`ProxyServer`](super::ProxyServer).
pub struct ProxyClient {
    path: PathBuf,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
    next_id: RequestId,
}

impl ProxyClient {
    /// Connect to the proxy at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::NoSession`] when nothing is listening there.
    pub async fn connect(path: &Path) -> Result<Self, ProxyError> {
        Self::connect_with_timeout(path, Duration::from_secs(DEFAULT_TIMEOUT_SECS)).await
    }

    /// Connect with a custom timeout, used for the connect itself and for
    /// every later call.
    pub async fn connect_with_timeout(path: &Path, timeout: Duration) -> Result<Self, ProxyError> {
        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| ProxyError::Timeout)?
            .map_err(|e| ProxyError::from_connect(path, e))?;
        let (read_half, write_half) = stream.into_split();

        tracing::debug!(path = %path.display(), "Connected to proxy");
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout,
            next_id: 1,
        })
    }

    /// Socket path this client is connected to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set the timeout for operations.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send one request and wait for its result.
    ///
    /// An error envelope becomes [`ProxyError::Remote`].
    pub async fn call<P: Serialize>(
        &mut self,
        method: Method,
        params: &P,
    ) -> Result<Value, ProxyError> {
        let id = self.next_id;
        self.next_id += 1;
        let request = Request::new(id, method, params)?;

        tokio::time::timeout(self.timeout, self.call_internal(request))
            .await
            .map_err(|_| ProxyError::Timeout)?
    }

    async fn call_internal(&mut self, request: Request) -> Result<Value, ProxyError> {
        let bytes = encode_line(&request)?;
        self.writer
            .write_all(&bytes)
            .await
            .map_err(ProxyError::Undelivered)?;
        self.writer.flush().await.map_err(ProxyError::Undelivered)?;

        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Err(ProxyError::Closed);
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = decode_response(line)?;
            if response.id != request.id {
                // Left over from a call that timed out.
                tracing::debug!(expected = request.id, got = response.id, "Skipping stale response");
                continue;
            }
            return response
                .into_result()
                .map_err(|body| ProxyError::Remote {
                    message: body.message,
                });
        }
    }

    async fn call_typed<P: Serialize, T: DeserializeOwned>(
        &mut self,
        method: Method,
        params: &P,
    ) -> Result<T, ProxyError> {
        let value = self.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Type text into the shell, pressing Enter when `submit` is set.
    pub async fn type_text(&mut self, text: &str, submit: bool) -> Result<(), ProxyError> {
        let params = TypeParams {
            text: text.to_string(),
            submit,
        };
        self.call(Method::Type, &params).await.map(|_| ())
    }

    /// Send a named key or chord.
    pub async fn send_key(&mut self, key: &str) -> Result<(), ProxyError> {
        let params = SendKeyParams {
            key: key.to_string(),
        };
        self.call(Method::SendKey, &params).await.map(|_| ())
    }

    /// Read the terminal text.
    pub async fn get_content(&mut self, visible_only: bool) -> Result<String, ProxyError> {
        let result: ContentResult = self
            .call_typed(Method::GetContent, &GetContentParams { visible_only })
            .await?;
        Ok(result.content)
    }

    pub async fn take_screenshot(&mut self) -> Result<Screenshot, ProxyError> {
        self.call_typed(Method::TakeScreenshot, &serde_json::json!({}))
            .await
    }

    pub async fn start_recording(
        &mut self,
        path: Option<String>,
    ) -> Result<RecordingStatus, ProxyError> {
        self.call_typed(Method::StartRecording, &StartRecordingParams { path })
            .await
    }

    pub async fn stop_recording(&mut self) -> Result<RecordingStatus, ProxyError> {
        self.call_typed(Method::StopRecording, &serde_json::json!({}))
            .await
    }
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellbridge_protocol::Response;
    use tempfile::tempdir;
    use tokio::net::UnixListener;

    /// Accept one connection and answer each line with `respond`.
    fn spawn_fake_server<F>(listener: UnixListener, respond: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(Request) -> Option<Response> + Send + 'static,
    {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            while reader.read_line(&mut line).await.unwrap() > 0 {
                let request: Request = serde_json::from_str(line.trim()).unwrap();
                line.clear();
                if let Some(response) = respond(request) {
                    let bytes = encode_line(&response).unwrap();
                    write_half.write_all(&bytes).await.unwrap();
                }
            }
        })
    }

    #[tokio::test]
    async fn test_connect_missing_socket() {
        let dir = tempdir().unwrap();
        let err = ProxyClient::connect(&dir.path().join("absent.sock"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::NoSession { .. }));
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = spawn_fake_server(listener, |request| {
            let result = match request.method.as_str() {
                "getContent" => serde_json::json!({"content": "$ ls\nREADME.md"}),
                _ => serde_json::json!({"ok": true}),
            };
            Some(Response::success(request.id, result))
        });

        let mut client = ProxyClient::connect(&path).await.unwrap();
        client.type_text("ls", true).await.unwrap();
        assert_eq!(client.get_content(false).await.unwrap(), "$ ls\nREADME.md");

        drop(client);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_remote() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let _server = spawn_fake_server(listener, |request| {
            Some(Response::failure(request.id, "invalid key: hyper+q"))
        });

        let mut client = ProxyClient::connect(&path).await.unwrap();
        let err = client.send_key("hyper+q").await.unwrap_err();
        match err {
            ProxyError::Remote { message } => assert_eq!(message, "invalid key: hyper+q"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = ProxyClient::connect(&path).await.unwrap();
        server.await.unwrap();
        let err = client.take_screenshot().await.unwrap_err();
        assert!(err.is_disconnect(), "unexpected error: {err:?}");
        assert!(err.is_undelivered(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let _server = spawn_fake_server(listener, |_| None);

        let mut client = ProxyClient::connect_with_timeout(&path, Duration::from_millis(100))
            .await
            .unwrap();
        let err = client.stop_recording().await.unwrap_err();
        assert!(matches!(err, ProxyError::Timeout));
        assert!(!err.is_disconnect());
        assert!(!err.is_undelivered());
    }
}
