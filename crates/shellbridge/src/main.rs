//! shellbridge
//!
//! One shell session shared between you, an AI assistant and a host
//! application.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use shellbridge::config::Config;
use shellbridge::interactive::InteractiveOptions;
use shellbridge::logging::{self, LogTarget};
use shellbridge::mode::{select_mode, Mode, ModeInputs};
use shellbridge::proxy::ServerOptions;
use shellbridge::session::{SessionManager, SessionOptions};
use shellbridge::{bridge, embedded, interactive};

/// Timeout for each tool call forwarded by the MCP bridge.
const BRIDGE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Share a live shell with an AI assistant.
///
/// In a terminal, starts your shell and opens the tool socket. With --mcp, or
/// when stdin is not a terminal, serves MCP on stdio and drives the shell of
/// the running instance.
#[derive(Parser, Debug)]
#[command(name = "shellbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Terminal width when stdin is not a terminal
    #[arg(long)]
    pub cols: Option<u16>,

    /// Terminal height when stdin is not a terminal
    #[arg(long)]
    pub rows: Option<u16>,

    /// Shell to launch
    #[arg(long)]
    pub shell: Option<String>,

    /// Working directory for the shell
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Tool socket path
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Run the shell through this wrapper command, e.g. "firejail --quiet"
    #[arg(long, value_name = "COMMAND")]
    pub sandbox: Option<String>,

    /// Serve MCP on stdio even when stdin is a terminal
    #[arg(long, conflicts_with = "embedded")]
    pub mcp: bool,

    /// Be driven by a host application over stdio
    #[arg(long)]
    pub embedded: bool,
}

impl Cli {
    /// Command line flags take precedence over file and environment.
    fn apply_to(&self, config: &mut Config) {
        if let Some(cols) = self.cols {
            config.session.cols = cols;
        }
        if let Some(rows) = self.rows {
            config.session.rows = rows;
        }
        if let Some(shell) = &self.shell {
            config.session.shell = shell.clone();
        }
        if let Some(socket) = &self.socket {
            config.proxy.socket_path = Some(socket.clone());
        }
        if let Some(sandbox) = &self.sandbox {
            let mut words = sandbox.split_whitespace().map(str::to_string);
            config.sandbox.enabled = true;
            config.sandbox.command = words.next().unwrap_or_default();
            config.sandbox.args = words.collect();
        }
    }
}

fn session_options(config: &Config, cwd: Option<PathBuf>) -> SessionOptions {
    SessionOptions {
        cols: config.session.cols,
        rows: config.session.rows,
        shell: (!config.session.shell.is_empty()).then(|| config.session.shell.clone()),
        cwd,
        scrollback: config.session.scrollback,
        shell_integration: config.session.shell_integration,
        ..SessionOptions::default()
    }
}

fn session_manager(config: &Config) -> anyhow::Result<Arc<SessionManager>> {
    let mut manager = SessionManager::new(config.recordings_dir());
    if let Some(wrapper) = config.sandbox.wrapper() {
        wrapper.validate()?;
        tracing::info!(command = %config.sandbox.command, "Sandboxing the shell");
        manager = manager.with_wrapper(Arc::new(wrapper));
    }
    Ok(Arc::new(manager))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };
    let env_overrides = config.apply_env_overrides();
    cli.apply_to(&mut config);
    config.validate()?;

    let mode = match select_mode(ModeInputs::detect(cli.mcp, cli.embedded)) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let logs_dir = config.logs_dir();
    let target = match mode {
        Mode::Interactive => LogTarget::File(&logs_dir),
        Mode::Detached | Mode::Embedded => LogTarget::Stderr,
    };
    let log_guard = logging::init(target, &config.general.log_level, cli.verbose)?;
    tracing::info!(?mode, "shellbridge starting");
    for applied in &env_overrides {
        tracing::info!(var = applied.var, value = %applied.value, "Configuration overridden from environment");
    }

    let socket_path = config.proxy.socket_path();
    match mode {
        Mode::Interactive => {
            let manager = session_manager(&config)?;
            let options = InteractiveOptions {
                session: session_options(&config, cli.cwd.clone()),
                socket_path,
                server: ServerOptions {
                    poll_interval: config.proxy.poll_interval(),
                    probe_timeout: config.proxy.probe_timeout(),
                },
            };
            let code = interactive::run(manager, options).await?;
            drop(log_guard);
            std::process::exit(code);
        }
        Mode::Detached => {
            bridge::run_stdio(&socket_path, BRIDGE_CALL_TIMEOUT).await?;
        }
        Mode::Embedded => {
            let manager = session_manager(&config)?;
            let code = embedded::run(
                manager,
                session_options(&config, cli.cwd.clone()),
                tokio::io::BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await?;
            drop(log_guard);
            std::process::exit(code.unwrap_or(0));
        }
    }

    Ok(())
}
