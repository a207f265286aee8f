//! # shellbridge
//!
//! Share one live shell session between a human, an AI assistant and a host
//! application.
//!
//! ## Overview
//!
//! A single process owns the shell. It runs on a pseudo-terminal with a
//! headless emulator keeping an addressable copy of the screen, so tool calls
//! can type, press keys and read back what the shell printed.
//!
//! - **Interactive**: your terminal is piped into the shell, and a Unix
//!   socket accepts tool calls for the same session.
//! - **Detached**: no shell of its own. MCP on stdio is forwarded over the
//!   socket to the interactive instance.
//! - **Embedded**: a host application drives the session with JSON lines on
//!   stdio.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Mode Dispatcher                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────────┐   ┌───────────────┐  │
//! │  │ Interactive │   │   MCP Bridge     │   │   Embedded    │  │
//! │  └──────┬──────┘   └────────┬─────────┘   └───────┬───────┘  │
//! │         │                   │ socket              │          │
//! │         │           ┌───────▼──────────┐          │          │
//! │         │           │  Proxy Server    │          │          │
//! │         │           └───────┬──────────┘          │          │
//! │  ┌──────▼───────────────────▼─────────────────────▼───────┐  │
//! │  │                    Session Manager                     │  │
//! │  └──────────────────────────┬─────────────────────────────┘  │
//! │  ┌──────────────────────────▼─────────────────────────────┐  │
//! │  │           Session (PTY + headless emulator)            │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shellbridge::session::{SessionManager, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = Arc::new(SessionManager::new("/tmp/recordings"));
//!     manager.init_session(SessionOptions::default()).await?;
//!
//!     manager.type_text("echo hello", true).await?;
//!     println!("{}", manager.content(true).await?);
//!
//!     manager.dispose_async().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`session`]: PTY session, emulator, key encoding, session manager
//! - [`proxy`]: Unix-socket tool proxy, server and client
//! - [`bridge`]: MCP server forwarding to the proxy
//! - [`embedded`]: stdio driver for host applications
//! - [`interactive`]: raw-mode terminal driver
//! - [`mode`]: startup posture selection
//! - [`config`]: configuration loading and defaults
//! - [`logging`]: tracing setup

pub mod bridge;
pub mod config;
pub mod embedded;
pub mod interactive;
pub mod logging;
pub mod mode;
pub mod proxy;
pub mod session;

// Re-export protocol for convenience
pub use shellbridge_protocol as protocol;

pub use config::Config;
pub use mode::{select_mode, Mode, ModeError, ModeInputs};
pub use proxy::{ProxyClient, ProxyError, ProxyServer, ServerOptions};
pub use session::{Session, SessionError, SessionId, SessionManager, SessionOptions};
