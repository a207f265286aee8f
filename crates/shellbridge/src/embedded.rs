//! Embedded posture: a host application drives the session over stdio.
//!
//! Input lines are [`EmbeddedCommand`]s, output lines are
//! [`EmbeddedEvent`]s. Shell output is streamed as it arrives and the driver
//! stops after emitting `exit`.

use std::sync::Arc;

use anyhow::Context;
use shellbridge_protocol::{decode_command, encode_line, EmbeddedCommand, EmbeddedEvent, Response};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::proxy::dispatch::{dispatch, SessionToolHandler};
use crate::session::{SessionExit, SessionManager, SessionOptions};

/// Run the embedded protocol until the session ends. Returns the shell's
/// exit code.
pub async fn run<R, W>(
    manager: Arc<SessionManager>,
    options: SessionOptions,
    reader: R,
    mut writer: W,
) -> anyhow::Result<Option<i32>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let session = manager
        .init_session(options)
        .await
        .context("Failed to start session")?;
    let mut attachment = session.attach().await?;
    let mut exit_rx = session.exit_receiver();
    let handler = SessionToolHandler::new(Arc::clone(&manager));

    emit(
        &mut writer,
        &EmbeddedEvent::Ready {
            session_id: session.id().clone(),
            pid: session.pid(),
            cols: attachment.cols,
            rows: attachment.rows,
        },
    )
    .await?;
    if !attachment.snapshot.is_empty() {
        emit(&mut writer, &EmbeddedEvent::output(&attachment.snapshot)).await?;
    }

    let mut lines = reader.lines();
    let mut input_open = true;
    let mut output_open = true;
    let mut resize_open = true;

    let exit = loop {
        if let Some(exit) = *exit_rx.borrow_and_update() {
            break exit;
        }

        tokio::select! {
            biased;

            chunk = attachment.output.recv(), if output_open => match chunk {
                Ok(bytes) => emit(&mut writer, &EmbeddedEvent::output(&bytes)).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Embedded host fell behind, output dropped");
                }
                Err(RecvError::Closed) => output_open = false,
            },

            size = attachment.resize.recv(), if resize_open => match size {
                Ok((cols, rows)) => emit(&mut writer, &EmbeddedEvent::Resize { cols, rows }).await?,
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => resize_open = false,
            },

            changed = exit_rx.changed() => {
                if changed.is_err() {
                    break (*exit_rx.borrow()).unwrap_or(SessionExit { code: None });
                }
            }

            line = lines.next_line(), if input_open => match line? {
                Some(line) => {
                    if let Some(event) = handle_line(&manager, &handler, &line).await {
                        emit(&mut writer, &event).await?;
                    }
                }
                None => {
                    tracing::info!("Embedded host closed stdin, disposing session");
                    input_open = false;
                    manager.dispose_async().await;
                }
            },
        }
    };

    // Output produced before the exit still belongs to the host.
    loop {
        match attachment.output.try_recv() {
            Ok(bytes) => emit(&mut writer, &EmbeddedEvent::output(&bytes)).await?,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    emit(&mut writer, &EmbeddedEvent::Exit { code: exit.code }).await?;
    manager.dispose_async().await;
    Ok(exit.code)
}

async fn handle_line(
    manager: &SessionManager,
    handler: &SessionToolHandler,
    line: &str,
) -> Option<EmbeddedEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let command = match decode_command(line) {
        Ok(command) => command,
        Err(e) => {
            return Some(EmbeddedEvent::Error {
                message: e.to_string(),
            })
        }
    };

    match command {
        EmbeddedCommand::Input { data } => {
            manager
                .type_text(&data, false)
                .await
                .err()
                .map(|e| EmbeddedEvent::Error {
                    message: e.to_string(),
                })
        }
        EmbeddedCommand::Resize { cols, rows } => {
            manager
                .resize(cols, rows)
                .await
                .err()
                .map(|e| EmbeddedEvent::Error {
                    message: e.to_string(),
                })
        }
        EmbeddedCommand::Request { id, method, params } => {
            let response = match dispatch(handler, &method, params).await {
                Ok(result) => Response::success(id, result),
                Err(e) => Response::failure(id, e.to_string()),
            };
            Some(EmbeddedEvent::Response(response))
        }
        EmbeddedCommand::Dispose => {
            tracing::info!("Embedded host requested dispose");
            manager.dispose_async().await;
            None
        }
    }
}

async fn emit<W: AsyncWrite + Unpin>(writer: &mut W, event: &EmbeddedEvent) -> anyhow::Result<()> {
    let bytes = encode_line(event)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
