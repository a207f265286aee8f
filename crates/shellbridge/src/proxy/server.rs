//! Proxy server: single-client NDJSON listener with takeover detection.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use shellbridge_protocol::{decode_request, encode_line, DecodeError, LineBuffer, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::dispatch::{dispatch, RequestHandler};
use super::ownership::{probe, OwnershipToken, SocketProbe};

/// Read size for client connections.
const READ_CHUNK_SIZE: usize = 8192;

/// Tunables for [`ProxyServer`].
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// How often the socket file's identity is checked.
    pub poll_interval: Duration,
    /// How long to wait when probing an existing socket at bind time.
    pub probe_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
        }
    }
}

struct ActiveClient {
    id: u64,
    cancel: CancellationToken,
}

struct ServerState {
    owned: AtomicBool,
    active: Mutex<Option<ActiveClient>>,
    next_client: AtomicU64,
    superseded: CancellationToken,
}

impl ServerState {
    fn active(&self) -> MutexGuard<'_, Option<ActiveClient>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn drop_active(&self) {
        if let Some(client) = self.active().take() {
            client.cancel.cancel();
        }
    }
}

/// Listens on the proxy socket and serves one client at a time.
pub struct ProxyServer {
    path: PathBuf,
    token: OwnershipToken,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    connections: TaskTracker,
}

impl ProxyServer {
    /// Bind the server to the specified socket path.
    ///
    /// Parent directories are created as needed. An existing file at the
    /// path is probed, logged as stale or live, and replaced.
    pub async fn bind(
        path: &Path,
        handler: Arc<dyn RequestHandler>,
        options: ServerOptions,
    ) -> Result<Self, io::Error> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        match probe(path, options.probe_timeout).await {
            SocketProbe::Absent => {}
            SocketProbe::Stale => {
                tracing::info!(path = %path.display(), "Removing stale proxy socket");
                std::fs::remove_file(path)?;
            }
            SocketProbe::Live => {
                tracing::warn!(
                    path = %path.display(),
                    "Another instance owns the proxy socket, taking it over"
                );
                std::fs::remove_file(path)?;
            }
        }

        let listener = UnixListener::bind(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        let token = OwnershipToken::capture(path)?;

        let state = Arc::new(ServerState {
            owned: AtomicBool::new(true),
            active: Mutex::new(None),
            next_client: AtomicU64::new(0),
            superseded: CancellationToken::new(),
        });
        let shutdown = CancellationToken::new();
        let connections = TaskTracker::new();

        let accept = tokio::spawn(accept_loop(
            listener,
            handler,
            Arc::clone(&state),
            shutdown.clone(),
            connections.clone(),
        ));
        let poll = tokio::spawn(poll_ownership(
            path.to_path_buf(),
            token,
            Arc::clone(&state),
            options.poll_interval,
            shutdown.clone(),
        ));

        tracing::info!(path = %path.display(), "Proxy server listening");

        Ok(Self {
            path: path.to_path_buf(),
            token,
            state,
            shutdown,
            tasks: Mutex::new(vec![accept, poll]),
            connections,
        })
    }

    /// Socket path this server bound.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the socket path still belongs to this server.
    pub fn is_owner(&self) -> bool {
        self.state.owned.load(Ordering::SeqCst)
    }

    /// Id of the connected client, if any.
    pub fn active_client(&self) -> Option<u64> {
        self.state.active().as_ref().map(|client| client.id)
    }

    /// Cancelled once another process has taken the socket path.
    pub fn superseded(&self) -> CancellationToken {
        self.state.superseded.clone()
    }

    /// Stop serving and remove the socket file if it is still ours.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.state.drop_active();

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
        self.connections.close();
        self.connections.wait().await;

        if self.is_owner() && self.token.check(&self.path).is_owned() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::debug!(path = %self.path.display(), error = %e, "Failed to remove proxy socket");
            }
        } else {
            tracing::debug!(path = %self.path.display(), "Leaving socket of the new owner in place");
        }
        tracing::info!(path = %self.path.display(), "Proxy server closed");
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.state.drop_active();
    }
}

async fn accept_loop(
    listener: UnixListener,
    handler: Arc<dyn RequestHandler>,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
    connections: TaskTracker,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let stream = match accepted {
            Ok((stream, _addr)) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept proxy connection");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        if !state.owned.load(Ordering::SeqCst) {
            tracing::debug!("Refusing proxy connection after takeover");
            drop(stream);
            continue;
        }

        let id = state.next_client.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = shutdown.child_token();
        let previous = state.active().replace(ActiveClient {
            id,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            tracing::info!(client = id, evicted = previous.id, "Evicting previous proxy client");
            previous.cancel.cancel();
        } else {
            tracing::info!(client = id, "Proxy client connected");
        }

        connections.spawn(serve_connection(
            stream,
            id,
            cancel,
            Arc::clone(&handler),
            Arc::clone(&state),
        ));
    }
}

async fn serve_connection(
    stream: UnixStream,
    id: u64,
    cancel: CancellationToken,
    handler: Arc<dyn RequestHandler>,
    state: Arc<ServerState>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    'connection: loop {
        while let Some(line) = buffer.next_line() {
            if cancel.is_cancelled() {
                break 'connection;
            }
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::debug!(client = id, error = %e, "Discarding proxy input");
                    continue;
                }
            };
            // An evicted client loses its in-flight request with the connection.
            let answered = tokio::select! {
                _ = cancel.cancelled() => break 'connection,
                answered = answer(handler.as_ref(), &line) => answered,
            };
            let Some(response) = answered else {
                continue;
            };
            let bytes = match encode_line(&response) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(client = id, error = %e, "Failed to encode response");
                    continue;
                }
            };
            if let Err(e) = writer.write_all(&bytes).await {
                tracing::debug!(client = id, error = %e, "Proxy client write failed");
                break 'connection;
            }
        }

        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read(&mut chunk) => read,
        };
        match read {
            Ok(0) => break,
            Ok(n) => buffer.extend(&chunk[..n]),
            Err(e) => {
                tracing::debug!(client = id, error = %e, "Proxy client read failed");
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    let mut active = state.active();
    if active.as_ref().map(|client| client.id) == Some(id) {
        *active = None;
    }
    tracing::debug!(client = id, "Proxy client disconnected");
}

/// Turn one line into a response, or `None` when there is nobody to answer.
async fn answer(handler: &dyn RequestHandler, line: &str) -> Option<Response> {
    match decode_request(line) {
        Ok(request) => {
            let response = match dispatch(handler, &request.method, request.params).await {
                Ok(result) => Response::success(request.id, result),
                Err(e) => {
                    tracing::debug!(id = request.id, method = %request.method, error = %e, "Request failed");
                    Response::failure(request.id, e.to_string())
                }
            };
            Some(response)
        }
        Err(DecodeError { id: Some(id), error }) => Some(Response::failure(id, error.to_string())),
        Err(DecodeError { id: None, error }) => {
            tracing::debug!(error = %error, "Dropping malformed proxy line");
            None
        }
    }
}

async fn poll_ownership(
    path: PathBuf,
    token: OwnershipToken,
    state: Arc<ServerState>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let status = token.check(&path);
        if !status.is_owned() {
            state.owned.store(false, Ordering::SeqCst);
            tracing::warn!(
                path = %path.display(),
                status = ?status,
                "Proxy socket was taken over, no longer serving"
            );
            state.drop_active();
            state.superseded.cancel();
            return;
        }
    }
}
