//! Session lifecycle management.
//!
//! The manager owns at most one live [`Session`] and exposes the typed
//! operations every front end (interactive driver, proxy server, embedded
//! driver) goes through. It is constructed once and shared as
//! `Arc<SessionManager>`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use shellbridge_protocol::Screenshot;

use super::keys;
use super::pty::{Session, SessionError, SessionId, SessionOptions};
use super::recording::{default_recording_path, RawRecorder, RecordingSummary};
use super::sandbox::CommandWrapper;

/// Information about the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub id: SessionId,
    /// Process ID of the shell.
    pub pid: Option<u32>,
    /// Current terminal columns.
    pub cols: u16,
    /// Current terminal rows.
    pub rows: u16,
}

/// Holds zero or one session.
pub struct SessionManager {
    current: Mutex<Option<Arc<Session>>>,
    init_lock: tokio::sync::Mutex<()>,
    recordings_dir: PathBuf,
    wrapper: Option<Arc<dyn CommandWrapper>>,
}

impl SessionManager {
    /// Creates a manager that stores unnamed recordings in `recordings_dir`.
    pub fn new(recordings_dir: impl Into<PathBuf>) -> Self {
        Self {
            current: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            recordings_dir: recordings_dir.into(),
            wrapper: None,
        }
    }

    /// Run every session through `wrapper`.
    pub fn with_wrapper(mut self, wrapper: Arc<dyn CommandWrapper>) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    /// Return the live session, creating one if there is none.
    ///
    /// A session whose shell has exited or that was disposed is replaced.
    pub async fn init_session(
        &self,
        mut options: SessionOptions,
    ) -> Result<Arc<Session>, SessionError> {
        let _guard = self.init_lock.lock().await;

        if let Some(existing) = self.session() {
            if !existing.is_disposed() {
                return Ok(existing);
            }
            tracing::info!(session_id = %existing.id(), "Replacing ended session");
        }

        if options.wrapper.is_none() {
            options.wrapper = self.wrapper.clone();
        }
        let session = Arc::new(Session::create(options).await?);
        *self.lock_current() = Some(Arc::clone(&session));
        Ok(session)
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.lock_current().clone()
    }

    /// Summary of the current session.
    pub async fn info(&self) -> Option<SessionInfo> {
        let session = self.session()?;
        let dims = session.dimensions().await.ok()?;
        Some(SessionInfo {
            id: session.id().clone(),
            pid: session.pid(),
            cols: dims.emulator.0,
            rows: dims.emulator.1,
        })
    }

    /// Type `text`, then press Enter when `submit` is set.
    pub async fn type_text(&self, text: &str, submit: bool) -> Result<(), SessionError> {
        let session = self.require()?;
        if !text.is_empty() {
            session.write(text.as_bytes()).await?;
        }
        if submit {
            session.write(b"\r").await?;
        }
        Ok(())
    }

    /// Send a key chord such as `ctrl+c` or `up`.
    pub async fn send_key(&self, key: &str) -> Result<(), SessionError> {
        let bytes = keys::encode_key(key)?;
        self.require()?.write(&bytes).await
    }

    pub async fn content(&self, visible_only: bool) -> Result<String, SessionError> {
        let session = self.require()?;
        if visible_only {
            session.visible_content().await
        } else {
            session.content().await
        }
    }

    pub async fn screenshot(&self) -> Result<Screenshot, SessionError> {
        self.require()?.screenshot().await
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), SessionError> {
        self.require()?.resize(cols, rows).await
    }

    /// Record raw output to `path`, or to a fresh file in the recordings
    /// directory.
    pub async fn start_recording(
        &self,
        path: Option<PathBuf>,
    ) -> Result<RecordingSummary, SessionError> {
        let session = self.require()?;
        if session.is_disposed() {
            return Err(SessionError::Disposed(session.id().clone()));
        }
        let path =
            path.unwrap_or_else(|| default_recording_path(&self.recordings_dir, session.id()));
        let recorder =
            RawRecorder::create(&path).map_err(|e| SessionError::Recording(e.to_string()))?;
        session.start_recording(Box::new(recorder)).await
    }

    pub async fn stop_recording(&self) -> Result<RecordingSummary, SessionError> {
        self.require()?.stop_recording().await
    }

    /// Start tearing everything down without waiting.
    pub fn dispose(&self) {
        let session = self.lock_current().take();
        if let Some(session) = session {
            tracing::info!(session_id = %session.id(), "Disposing session");
            session.dispose_now();
        }
        if let Some(wrapper) = self.wrapper.clone() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { wrapper.teardown().await });
            }
        }
    }

    /// Tear everything down and wait for it to finish.
    pub async fn dispose_async(&self) {
        let session = self.lock_current().take();
        if let Some(session) = session {
            tracing::info!(session_id = %session.id(), "Disposing session");
            session.dispose().await;
        }
        if let Some(wrapper) = &self.wrapper {
            wrapper.teardown().await;
        }
    }

    fn require(&self) -> Result<Arc<Session>, SessionError> {
        self.session().ok_or(SessionError::NoSession)
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Arc<Session>>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::sandbox::{PrefixWrapper, SandboxError, WrappedCommand};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    fn sh_options() -> SessionOptions {
        SessionOptions {
            shell: Some("/bin/sh".to_string()),
            shell_integration: false,
            ..SessionOptions::default()
        }
    }

    async fn wait_for_content(manager: &SessionManager, needle: &str) -> String {
        let mut content = String::new();
        for _ in 0..100 {
            content = manager.content(false).await.unwrap();
            if content.contains(needle) {
                return content;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("{needle:?} never appeared in:\n{content}");
    }

    #[tokio::test]
    async fn test_operations_without_session() {
        let manager = SessionManager::new(std::env::temp_dir());
        assert!(manager.session().is_none());
        assert!(manager.info().await.is_none());
        assert!(matches!(
            manager.type_text("ls", true).await,
            Err(SessionError::NoSession)
        ));
        assert!(matches!(
            manager.screenshot().await,
            Err(SessionError::NoSession)
        ));
    }

    #[tokio::test]
    async fn test_init_session_is_idempotent() {
        let manager = SessionManager::new(std::env::temp_dir());
        let first = manager.init_session(sh_options()).await.unwrap();
        let second = manager.init_session(sh_options()).await.unwrap();
        assert_eq!(first.id(), second.id());
        manager.dispose_async().await;
    }

    #[tokio::test]
    async fn test_init_session_replaces_disposed_session() {
        let manager = SessionManager::new(std::env::temp_dir());
        let first = manager.init_session(sh_options()).await.unwrap();
        first.dispose().await;

        let second = manager.init_session(sh_options()).await.unwrap();
        assert_ne!(first.id(), second.id());
        manager.dispose_async().await;
    }

    #[tokio::test]
    async fn test_type_and_read_back() {
        let manager = SessionManager::new(std::env::temp_dir());
        manager.init_session(sh_options()).await.unwrap();

        manager
            .type_text("echo typed_$((6*7))", true)
            .await
            .unwrap();
        wait_for_content(&manager, "typed_42").await;

        let info = manager.info().await.unwrap();
        assert_eq!((info.cols, info.rows), (80, 24));
        manager.dispose_async().await;
    }

    #[tokio::test]
    async fn test_full_content_after_several_screens_of_output() {
        let manager = SessionManager::new(std::env::temp_dir());
        manager.init_session(sh_options()).await.unwrap();

        manager.type_text("seq 1 100", true).await.unwrap();
        let content = wait_for_content(&manager, "\n100").await;
        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        assert!(lines.contains(&"1"));
        assert!(lines.contains(&"50"));

        // The session is still alive and usable afterwards.
        manager
            .type_text("echo still_$((2+2))", true)
            .await
            .unwrap();
        wait_for_content(&manager, "still_4").await;
        manager.dispose_async().await;
    }

    #[tokio::test]
    async fn test_send_key_interrupts() {
        let manager = SessionManager::new(std::env::temp_dir());
        manager.init_session(sh_options()).await.unwrap();

        manager.type_text("sleep 30", true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        manager.send_key("ctrl+c").await.unwrap();
        manager
            .type_text("echo after_$((1+1))", true)
            .await
            .unwrap();
        wait_for_content(&manager, "after_2").await;

        assert!(matches!(
            manager.send_key("hyper+q").await,
            Err(SessionError::InvalidKey(_))
        ));
        manager.dispose_async().await;
    }

    #[tokio::test]
    async fn test_recording_to_default_path() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        manager.init_session(sh_options()).await.unwrap();

        let started = manager.start_recording(None).await.unwrap();
        let path = started.path.clone().unwrap();
        assert!(path.starts_with(dir.path()));

        manager.type_text("echo rec_$((5+5))", true).await.unwrap();
        wait_for_content(&manager, "rec_10").await;
        let stopped = manager.stop_recording().await.unwrap();
        assert_eq!(stopped.path, Some(path.clone()));
        assert!(stopped.bytes > 0);
        manager.dispose_async().await;
    }

    #[tokio::test]
    async fn test_dispose_clears_session() {
        let manager = SessionManager::new(std::env::temp_dir());
        let session = manager.init_session(sh_options()).await.unwrap();

        manager.dispose_async().await;
        assert!(session.is_disposed());
        assert!(manager.session().is_none());
        assert!(matches!(
            manager.content(false).await,
            Err(SessionError::NoSession)
        ));

        // Disposing again is harmless.
        manager.dispose_async().await;
        manager.dispose();
    }

    struct CountingWrapper {
        inner: PrefixWrapper,
        teardowns: AtomicUsize,
    }

    #[async_trait]
    impl CommandWrapper for CountingWrapper {
        fn name(&self) -> &str {
            "counting"
        }

        async fn wrap(
            &self,
            program: &str,
            args: &[String],
        ) -> Result<WrappedCommand, SandboxError> {
            self.inner.wrap(program, args).await
        }

        async fn teardown(&self) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_wrapper_is_applied_and_torn_down() {
        let wrapper = Arc::new(CountingWrapper {
            inner: PrefixWrapper::new("env", ["WRAPPED_BY=shellbridge-test"]),
            teardowns: AtomicUsize::new(0),
        });
        let manager = SessionManager::new(std::env::temp_dir()).with_wrapper(wrapper.clone());
        manager.init_session(sh_options()).await.unwrap();

        manager
            .type_text("echo \"wrapped=$WRAPPED_BY\"", true)
            .await
            .unwrap();
        wait_for_content(&manager, "wrapped=shellbridge-test").await;

        manager.dispose_async().await;
        assert_eq!(wrapper.teardowns.load(Ordering::SeqCst), 1);
    }
}
