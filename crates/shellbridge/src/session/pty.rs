//! PTY session.
//!
//! A session is one shell process on a pseudo-terminal plus a headless
//! emulator mirroring everything the shell prints. All mutable state lives in
//! a single actor task; [`Session`] is a cheap handle that sends it commands.
//!
//! ```text
//!  reader thread ──Data/Eof──┐
//!  waiter thread ──Exited────┼──▶ SessionActor ──▶ writer thread ──▶ PTY
//!  Session handle ─Command───┘        │
//!                                      ├─ Screen (vt100) + MarkerScanner
//!                                      ├─ RecordingSink
//!                                      └─ output / resize / exit channels
//! ```
//!
//! Once disposed (explicitly, or because the shell exited) the actor stops:
//! temporary startup files are removed, an active recording is finished, the
//! event channels close and the exit status is published exactly once.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use shellbridge_protocol::Screenshot;
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use uuid::Uuid;

use super::hooks;
use super::keys::InvalidKey;
use super::markers::{MarkerScanner, ShellState};
use super::process::{self, ProcessInfo};
use super::recording::{RecordingSink, RecordingSummary};
use super::sandbox::{CommandWrapper, SandboxError};
use super::screen::{Screen, DEFAULT_SCROLLBACK};

/// Unique identifier for a session.
pub type SessionId = String;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session has been disposed or its shell has exited.
    #[error("session disposed: {0}")]
    Disposed(SessionId),

    /// No session has been created yet.
    #[error("no active session")]
    NoSession,

    /// Failed to spawn the PTY.
    #[error("failed to spawn PTY: {0}")]
    SpawnFailed(String),

    /// Failed to write to the PTY.
    #[error("failed to write to PTY: {0}")]
    WriteFailed(String),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    ResizeFailed(String),

    /// Recording could not be started or stopped.
    #[error("recording error: {0}")]
    Recording(String),

    /// A key chord could not be encoded.
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),

    /// The command wrapper failed.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionExit {
    /// Shell exit code, or `None` when the session was disposed.
    pub code: Option<i32>,
}

/// Parameters for [`Session::create`].
#[derive(Clone)]
pub struct SessionOptions {
    pub cols: u16,
    pub rows: u16,
    /// Shell program; `$SHELL` or `/bin/sh` when unset.
    pub shell: Option<String>,
    /// Working directory; the current directory when unset.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables, applied after the session's own.
    pub env: Vec<(String, String)>,
    pub scrollback: usize,
    /// Inject prompt and cwd markers into supported shells.
    pub shell_integration: bool,
    pub wrapper: Option<Arc<dyn CommandWrapper>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            shell: None,
            cwd: None,
            env: Vec::new(),
            scrollback: DEFAULT_SCROLLBACK,
            shell_integration: true,
            wrapper: None,
        }
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .field("shell", &self.shell)
            .field("cwd", &self.cwd)
            .field("scrollback", &self.scrollback)
            .field("shell_integration", &self.shell_integration)
            .field("wrapper", &self.wrapper.as_ref().map(|w| w.name().to_string()))
            .finish()
    }
}

/// Emulator and PTY geometry, both as `(cols, rows)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub emulator: (u16, u16),
    pub pty: (u16, u16),
}

/// A consistent view for a consumer joining a running session.
///
/// `snapshot` redraws the screen as it was when the subscriptions were
/// created; every later byte arrives on `output`.
pub struct Attachment {
    pub snapshot: Vec<u8>,
    pub cols: u16,
    pub rows: u16,
    pub output: broadcast::Receiver<Vec<u8>>,
    pub resize: broadcast::Receiver<(u16, u16)>,
}

/// Buffer size for reading from PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Channel capacity for broadcast output.
const BROADCAST_CAPACITY: usize = 1024;

const COMMAND_CAPACITY: usize = 64;

/// How long to wait for trailing output once the shell has exited.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(200);

enum PtyEvent {
    Data(Vec<u8>),
    Eof,
    Exited(i32),
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Write {
        data: Vec<u8>,
        reply: Reply<Result<(), SessionError>>,
    },
    Resize {
        cols: u16,
        rows: u16,
        reply: Reply<Result<(), SessionError>>,
    },
    Content {
        visible_only: bool,
        reply: Reply<String>,
    },
    Screenshot {
        reply: Reply<Screenshot>,
    },
    Dimensions {
        reply: Reply<Dimensions>,
    },
    ShellState {
        reply: Reply<ShellState>,
    },
    Attach {
        reply: Reply<Attachment>,
    },
    StartRecording {
        sink: Box<dyn RecordingSink>,
        reply: Reply<Result<RecordingSummary, SessionError>>,
    },
    StopRecording {
        reply: Reply<Result<RecordingSummary, SessionError>>,
    },
    Dispose {
        reply: Option<Reply<()>>,
    },
}

enum Flow {
    Continue,
    Stop(Option<Reply<()>>),
}

struct WriteJob {
    data: Vec<u8>,
    reply: Reply<Result<(), SessionError>>,
}

/// Handle to a running PTY session.
pub struct Session {
    id: SessionId,
    pid: Option<u32>,
    commands: mpsc::Sender<Command>,
    exit_rx: watch::Receiver<Option<SessionExit>>,
    disposed: Arc<AtomicBool>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
}

impl Session {
    /// Spawn a shell on a new PTY and start the session actor.
    pub async fn create(options: SessionOptions) -> Result<Self, SessionError> {
        let id = Uuid::new_v4().to_string();
        let cols = options.cols.max(1);
        let rows = options.rows.max(1);

        let shell = detect_shell(options.shell.clone());
        let mut launch = hooks::prepare(&shell, &id, options.shell_integration)?;

        let (program, args) = match &options.wrapper {
            Some(wrapper) => {
                let wrapped = wrapper.wrap(&launch.program, &launch.args).await?;
                tracing::info!(
                    session_id = %id,
                    wrapper = %wrapper.name(),
                    "Wrapping shell command"
                );
                (wrapped.program, wrapped.args)
            }
            None => (launch.program.clone(), launch.args.clone()),
        };

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&program);
        cmd.args(&args);
        let cwd = match &options.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        cmd.cwd(&cwd);
        for (key, value) in launch.env.iter().chain(options.env.iter()) {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        // The reader only sees EOF once every slave handle is closed.
        drop(pair.slave);

        let pid = child.process_id();
        let master = pair.master;
        let reader = master
            .try_clone_reader()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        let actor_killer = child.clone_killer();
        let handle_killer = child.clone_killer();

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let reader_tx = event_tx.clone();
        let reader_id = id.clone();
        std::thread::Builder::new()
            .name("shellbridge-pty-reader".to_string())
            .spawn(move || read_loop(reader, reader_tx, reader_id))?;

        let waiter_id = id.clone();
        std::thread::Builder::new()
            .name("shellbridge-pty-waiter".to_string())
            .spawn(move || {
                let code = match child.wait() {
                    Ok(status) => status.exit_code() as i32,
                    Err(e) => {
                        tracing::warn!(session_id = %waiter_id, error = %e, "Failed to wait for shell");
                        -1
                    }
                };
                let _ = event_tx.send(PtyEvent::Exited(code));
            })?;

        let (write_tx, write_rx) = std_mpsc::channel::<WriteJob>();
        std::thread::Builder::new()
            .name("shellbridge-pty-writer".to_string())
            .spawn(move || write_loop(writer, write_rx))?;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (output_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (resize_tx, _) = broadcast::channel(16);
        let (exit_tx, exit_rx) = watch::channel(None);
        let disposed = Arc::new(AtomicBool::new(false));

        let actor = SessionActor {
            id: id.clone(),
            screen: Screen::new(cols, rows, options.scrollback),
            markers: MarkerScanner::new(),
            master,
            writes: write_tx,
            killer: actor_killer,
            recorder: None,
            output_tx,
            resize_tx,
            exit_tx,
            disposed: Arc::clone(&disposed),
            hooks_dir: launch.take_hooks_dir(),
            child_exited: false,
        };
        tokio::spawn(actor.run(commands_rx, event_rx));

        tracing::info!(
            session_id = %id,
            pid = ?pid,
            shell = %shell,
            cwd = %cwd.display(),
            cols,
            rows,
            "Session created"
        );

        Ok(Self {
            id,
            pid,
            commands: commands_tx,
            exit_rx,
            disposed,
            killer: Mutex::new(handle_killer),
        })
    }

    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the process ID of the shell, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the session no longer accepts input.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Exit status, once published.
    pub fn exit_status(&self) -> Option<SessionExit> {
        *self.exit_rx.borrow()
    }

    /// A receiver that observes the exit status.
    pub fn exit_receiver(&self) -> watch::Receiver<Option<SessionExit>> {
        self.exit_rx.clone()
    }

    /// Wait until the session has ended.
    pub async fn wait(&self) -> SessionExit {
        let mut rx = self.exit_rx.clone();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(exit) => *exit,
            Err(_) => None,
        };
        exit.unwrap_or(SessionExit { code: None })
    }

    /// Write bytes to the shell's stdin. Writes are applied in call order.
    pub async fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        let data = data.to_vec();
        self.request(|reply| Command::Write { data, reply }).await?
    }

    /// Resize the PTY and the emulator together.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), SessionError> {
        self.request(|reply| Command::Resize { cols, rows, reply })
            .await?
    }

    /// Scrollback plus viewport, trailing blank lines trimmed.
    pub async fn content(&self) -> Result<String, SessionError> {
        self.request(|reply| Command::Content {
            visible_only: false,
            reply,
        })
        .await
    }

    /// The viewport only.
    pub async fn visible_content(&self) -> Result<String, SessionError> {
        self.request(|reply| Command::Content {
            visible_only: true,
            reply,
        })
        .await
    }

    pub async fn screenshot(&self) -> Result<Screenshot, SessionError> {
        self.request(|reply| Command::Screenshot { reply }).await
    }

    pub async fn dimensions(&self) -> Result<Dimensions, SessionError> {
        self.request(|reply| Command::Dimensions { reply }).await
    }

    /// What the shell-integration markers have reported so far.
    pub async fn shell_state(&self) -> Result<ShellState, SessionError> {
        self.request(|reply| Command::ShellState { reply }).await
    }

    /// Subscribe to output with a replay of the current screen.
    pub async fn attach(&self) -> Result<Attachment, SessionError> {
        self.request(|reply| Command::Attach { reply }).await
    }

    /// Start feeding the output stream to `sink`.
    pub async fn start_recording(
        &self,
        sink: Box<dyn RecordingSink>,
    ) -> Result<RecordingSummary, SessionError> {
        self.request(|reply| Command::StartRecording { sink, reply })
            .await?
    }

    /// Finish the active recording.
    pub async fn stop_recording(&self) -> Result<RecordingSummary, SessionError> {
        self.request(|reply| Command::StopRecording { reply })
            .await?
    }

    /// The deepest live process under the shell.
    pub async fn foreground_process(&self) -> Option<ProcessInfo> {
        if self.is_disposed() {
            return None;
        }
        let pid = self.pid?;
        tokio::task::spawn_blocking(move || process::foreground_process(pid))
            .await
            .ok()
            .flatten()
    }

    /// Working directory of the foreground process, falling back to the
    /// directory the shell last reported.
    pub async fn cwd(&self) -> Option<PathBuf> {
        if let Some(fg) = self.foreground_process().await {
            let pid = fg.pid;
            let found = tokio::task::spawn_blocking(move || process::process_cwd(pid))
                .await
                .ok()
                .flatten();
            if found.is_some() {
                return found;
            }
        }
        self.shell_state().await.ok().and_then(|state| state.cwd)
    }

    /// Kill the shell and release everything. Safe to call repeatedly.
    pub async fn dispose(&self) {
        self.kill();
        let (reply, done) = oneshot::channel();
        if self
            .commands
            .send(Command::Dispose { reply: Some(reply) })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
        self.wait().await;
    }

    /// Start disposal without waiting for it to finish.
    pub fn dispose_now(&self) {
        self.kill();
        let _ = self.commands.try_send(Command::Dispose { reply: None });
    }

    fn kill(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.exit_status().is_some() {
            return;
        }
        if let Ok(mut killer) = self.killer.lock() {
            if let Err(e) = killer.kill() {
                tracing::debug!(session_id = %self.id, error = %e, "Kill failed");
            }
        }
    }

    fn disposed_error(&self) -> SessionError {
        SessionError::Disposed(self.id.clone())
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        if self.is_disposed() {
            return Err(self.disposed_error());
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| self.disposed_error())?;
        response.await.map_err(|_| self.disposed_error())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose_now();
    }
}

struct SessionActor {
    id: SessionId,
    screen: Screen,
    markers: MarkerScanner,
    master: Box<dyn MasterPty + Send>,
    writes: std_mpsc::Sender<WriteJob>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    recorder: Option<Box<dyn RecordingSink>>,
    output_tx: broadcast::Sender<Vec<u8>>,
    resize_tx: broadcast::Sender<(u16, u16)>,
    exit_tx: watch::Sender<Option<SessionExit>>,
    disposed: Arc<AtomicBool>,
    hooks_dir: Option<TempDir>,
    child_exited: bool,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<PtyEvent>,
    ) {
        let mut eof = false;
        let mut exit_code: Option<i32> = None;
        let mut drain_deadline: Option<Instant> = None;
        let mut events_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Flow::Stop(reply) = self.handle_command(command) {
                            self.finalize(exit_code);
                            if let Some(reply) = reply {
                                let _ = reply.send(());
                            }
                            return;
                        }
                    }
                    None => {
                        tracing::debug!(session_id = %self.id, "All session handles dropped");
                        self.finalize(exit_code);
                        return;
                    }
                },
                event = events.recv(), if events_open => match event {
                    Some(PtyEvent::Data(data)) => self.handle_output(data),
                    Some(PtyEvent::Eof) => {
                        eof = true;
                        if self.child_exited {
                            self.finalize(exit_code);
                            return;
                        }
                    }
                    None => {
                        eof = true;
                        events_open = false;
                        if self.child_exited {
                            self.finalize(exit_code);
                            return;
                        }
                    }
                    Some(PtyEvent::Exited(code)) => {
                        self.child_exited = true;
                        exit_code = Some(code);
                        if eof {
                            self.finalize(exit_code);
                            return;
                        }
                        drain_deadline = Some(Instant::now() + EXIT_DRAIN_GRACE);
                    }
                },
                _ = sleep_until_opt(drain_deadline) => {
                    tracing::debug!(session_id = %self.id, "Shell exited without closing the PTY");
                    self.finalize(exit_code);
                    return;
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Write { data, reply } => {
                if let Err(std_mpsc::SendError(job)) = self.writes.send(WriteJob { data, reply }) {
                    let _ = job
                        .reply
                        .send(Err(SessionError::WriteFailed("writer closed".to_string())));
                }
            }
            Command::Resize { cols, rows, reply } => {
                let _ = reply.send(self.resize(cols, rows));
            }
            Command::Content {
                visible_only,
                reply,
            } => {
                let content = if visible_only {
                    self.screen.visible_content()
                } else {
                    self.screen.content()
                };
                let _ = reply.send(content);
            }
            Command::Screenshot { reply } => {
                let _ = reply.send(self.screen.screenshot());
            }
            Command::Dimensions { reply } => {
                let pty = self
                    .master
                    .get_size()
                    .map(|size| (size.cols, size.rows))
                    .unwrap_or((0, 0));
                let _ = reply.send(Dimensions {
                    emulator: self.screen.size(),
                    pty,
                });
            }
            Command::ShellState { reply } => {
                let _ = reply.send(self.markers.state().clone());
            }
            Command::Attach { reply } => {
                let (cols, rows) = self.screen.size();
                let _ = reply.send(Attachment {
                    snapshot: self.screen.formatted(),
                    cols,
                    rows,
                    output: self.output_tx.subscribe(),
                    resize: self.resize_tx.subscribe(),
                });
            }
            Command::StartRecording { mut sink, reply } => {
                let result = if self.recorder.is_some() {
                    Err(SessionError::Recording("already recording".to_string()))
                } else {
                    let (cols, rows) = self.screen.size();
                    match sink.start(cols, rows) {
                        Ok(()) => {
                            let summary = sink.summary();
                            self.recorder = Some(sink);
                            tracing::info!(session_id = %self.id, path = ?summary.path, "Recording started");
                            Ok(summary)
                        }
                        Err(e) => Err(SessionError::Recording(e.to_string())),
                    }
                };
                let _ = reply.send(result);
            }
            Command::StopRecording { reply } => {
                let result = match self.recorder.take() {
                    Some(mut sink) => sink
                        .finish()
                        .map_err(|e| SessionError::Recording(e.to_string())),
                    None => Err(SessionError::Recording("not recording".to_string())),
                };
                if let Ok(summary) = &result {
                    tracing::info!(
                        session_id = %self.id,
                        path = ?summary.path,
                        bytes = summary.bytes,
                        "Recording stopped"
                    );
                }
                let _ = reply.send(result);
            }
            Command::Dispose { reply } => return Flow::Stop(reply),
        }
        Flow::Continue
    }

    fn handle_output(&mut self, data: Vec<u8>) {
        self.screen.process(&data);
        self.markers.feed(&data);
        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.data(&data) {
                tracing::warn!(session_id = %self.id, error = %e, "Recording failed, stopping it");
                if let Some(mut recorder) = self.recorder.take() {
                    let _ = recorder.finish();
                }
            }
        }
        if self.output_tx.send(data).is_err() {
            tracing::trace!(session_id = %self.id, "No receivers for output");
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), SessionError> {
        if cols == 0 || rows == 0 {
            return Err(SessionError::ResizeFailed(format!(
                "invalid size {cols}x{rows}"
            )));
        }
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::ResizeFailed(e.to_string()))?;
        self.screen.resize(cols, rows);
        if let Some(recorder) = self.recorder.as_mut() {
            let _ = recorder.resize(cols, rows);
        }
        let _ = self.resize_tx.send((cols, rows));

        tracing::debug!(session_id = %self.id, cols, rows, "Resized PTY");
        Ok(())
    }

    fn finalize(&mut self, exit_code: Option<i32>) {
        let disposed = self.disposed.swap(true, Ordering::SeqCst);
        let exit = SessionExit {
            code: if disposed { None } else { exit_code },
        };

        if !self.child_exited {
            if let Err(e) = self.killer.kill() {
                tracing::debug!(session_id = %self.id, error = %e, "Kill failed");
            }
        }

        if let Some(mut recorder) = self.recorder.take() {
            match recorder.finish() {
                Ok(summary) => {
                    tracing::info!(session_id = %self.id, path = ?summary.path, bytes = summary.bytes, "Recording finished on disposal")
                }
                Err(e) => tracing::warn!(session_id = %self.id, error = %e, "Failed to finish recording"),
            }
        }

        if let Some(dir) = self.hooks_dir.take() {
            if let Err(e) = dir.close() {
                tracing::debug!(session_id = %self.id, error = %e, "Failed to remove startup files");
            }
        }

        self.exit_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(exit);
            true
        });

        tracing::info!(session_id = %self.id, code = ?exit.code, "Session ended");
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    events: mpsc::UnboundedSender<PtyEvent>,
    session_id: SessionId,
) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                if events.send(PtyEvent::Data(buffer[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO is how Linux reports that the slave side has closed.
                tracing::debug!(session_id = %session_id, error = %e, "PTY read ended");
                break;
            }
        }
    }
    let _ = events.send(PtyEvent::Eof);
}

fn write_loop(mut writer: Box<dyn Write + Send>, jobs: std_mpsc::Receiver<WriteJob>) {
    while let Ok(job) = jobs.recv() {
        let result = writer
            .write_all(&job.data)
            .and_then(|()| writer.flush())
            .map_err(|e| SessionError::WriteFailed(e.to_string()));
        let _ = job.reply.send(result);
    }
}

/// Detects the shell to use.
///
/// Returns the shell in this order of preference:
/// 1. The provided shell if Some
/// 2. The $SHELL environment variable
/// 3. /bin/sh as fallback
pub fn detect_shell(shell: Option<String>) -> String {
    if let Some(s) = shell.filter(|s| !s.is_empty()) {
        return s;
    }

    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}
