//! Interactive posture: the user's terminal is piped straight into the
//! session while the proxy socket lets a detached client drive it too.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;

use crate::proxy::{ProxyServer, ServerOptions, SessionToolHandler};
use crate::session::{SessionExit, SessionManager, SessionOptions};

/// Byte the terminal driver turns into SIGINT.
const ETX: u8 = 0x03;

/// How long to wait for the last output to reach the terminal on exit.
const OUTPUT_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Settings for [`run`].
#[derive(Debug, Clone)]
pub struct InteractiveOptions {
    pub session: SessionOptions,
    pub socket_path: PathBuf,
    pub server: ServerOptions,
}

/// Puts the terminal in raw mode until dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Exit code for the process once the session is over.
pub fn exit_code(exit: SessionExit) -> i32 {
    exit.code.unwrap_or(0)
}

/// Conventional exit code for death by `signal`.
fn signal_exit_code(signal: i32) -> i32 {
    128 + signal
}

/// Run until the shell exits or a termination signal arrives. Returns the
/// process exit code.
pub async fn run(manager: Arc<SessionManager>, mut options: InteractiveOptions) -> anyhow::Result<i32> {
    if let Ok((cols, rows)) = crossterm::terminal::size() {
        options.session.cols = cols;
        options.session.rows = rows;
    }

    let session = manager
        .init_session(options.session)
        .await
        .context("Failed to start shell session")?;
    tracing::info!(session_id = %session.id(), pid = ?session.pid(), "Interactive session started");

    let server = match ProxyServer::bind(
        &options.socket_path,
        Arc::new(SessionToolHandler::new(Arc::clone(&manager))),
        options.server,
    )
    .await
    {
        Ok(server) => Some(server),
        Err(e) => {
            tracing::warn!(
                path = %options.socket_path.display(),
                error = %e,
                "Tool proxy unavailable, continuing without it"
            );
            None
        }
    };
    let superseded = server.as_ref().map(ProxyServer::superseded);

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to register SIGHUP handler")?;
    let mut sigwinch =
        signal(SignalKind::window_change()).context("Failed to register SIGWINCH handler")?;

    let raw_mode = RawModeGuard::enable().context("Failed to enable raw mode")?;

    let mut attachment = session.attach().await?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&attachment.snapshot).await?;
    stdout.flush().await?;

    let output_task = tokio::spawn(async move {
        loop {
            match attachment.output.recv().await {
                Ok(bytes) => {
                    if stdout.write_all(&bytes).await.is_err() {
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Terminal output fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let input_session = Arc::clone(&session);
    let input_task = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = vec![0u8; 4096];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = input_session.write(&buf[..n]).await {
                        tracing::debug!(error = %e, "Stopped forwarding input");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read terminal input");
                    break;
                }
            }
        }
    });

    let mut takeover_reported = false;
    let code = loop {
        tokio::select! {
            exit = session.wait() => break exit_code(exit),

            _ = sigint.recv() => {
                if let Err(e) = session.write(&[ETX]).await {
                    tracing::debug!(error = %e, "Failed to forward SIGINT");
                }
            }

            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
                manager.dispose_async().await;
                break signal_exit_code(nix::sys::signal::Signal::SIGTERM as i32);
            }

            _ = sighup.recv() => {
                tracing::info!("Received SIGHUP");
                manager.dispose_async().await;
                break signal_exit_code(nix::sys::signal::Signal::SIGHUP as i32);
            }

            _ = sigwinch.recv() => {
                if let Ok((cols, rows)) = crossterm::terminal::size() {
                    if let Err(e) = manager.resize(cols, rows).await {
                        tracing::debug!(error = %e, "Failed to follow terminal resize");
                    }
                }
            }

            _ = async {
                match &superseded {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            }, if !takeover_reported => {
                takeover_reported = true;
                tracing::warn!("Another shellbridge instance took over the tool socket");
            }
        }
    };

    input_task.abort();
    manager.dispose_async().await;
    let _ = tokio::time::timeout(OUTPUT_FLUSH_TIMEOUT, output_task).await;
    drop(raw_mode);

    if let Some(server) = server {
        server.close().await;
    }

    tracing::info!(code, "Interactive session ended");
    Ok(code)
}
