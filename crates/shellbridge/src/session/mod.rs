//! Session management module.
//!
//! This module provides the PTY-backed shell session, its headless screen
//! buffer and the manager that owns the single live session.

pub mod hooks;
pub mod keys;
pub mod manager;
pub mod markers;
pub mod process;
pub mod pty;
pub mod recording;
pub mod sandbox;
pub mod screen;

pub use manager::{SessionInfo, SessionManager};
pub use markers::ShellState;
pub use process::ProcessInfo;
pub use pty::{
    Attachment, Dimensions, Session, SessionError, SessionExit, SessionId, SessionOptions,
};
pub use recording::{RawRecorder, RecordingSink, RecordingSummary};
pub use sandbox::{CommandWrapper, PrefixWrapper, SandboxError, WrappedCommand};
pub use screen::Screen;
