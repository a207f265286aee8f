//! Configuration management for shellbridge.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/shellbridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{screen::DEFAULT_SCROLLBACK, PrefixWrapper};

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("cols and rows must be between 1 and 1000, got {cols}x{rows}")]
    InvalidDimensions { cols: u16, rows: u16 },

    #[error("poll_interval_ms must be between 50 and 60000, got {0}")]
    InvalidPollInterval(u64),

    #[error("probe_timeout_ms must be between 10 and 30000, got {0}")]
    InvalidProbeTimeout(u64),

    #[error("shell not found: {0}")]
    InvalidShellPath(String),

    #[error("sandbox is enabled but no sandbox command is configured")]
    MissingSandboxCommand,

    #[error("sandbox command not found: {0}")]
    InvalidSandboxCommand(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// One configuration value taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOverride {
    pub var: &'static str,
    pub value: String,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub session: SessionConfig,
    pub proxy: ProxyConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory for logs and recordings.
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell to launch. Empty means `$SHELL`, then `/bin/sh`.
    pub shell: String,
    /// Initial columns when stdin is not a terminal.
    pub cols: u16,
    /// Initial rows when stdin is not a terminal.
    pub rows: u16,
    /// Lines of scrollback kept by the emulator.
    pub scrollback: usize,
    /// Inject prompt and cwd markers into bash, zsh and fish.
    pub shell_integration: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Socket path. Unset means the per-user runtime directory.
    pub socket_path: Option<PathBuf>,
    /// How often a server checks that the socket is still its own.
    pub poll_interval_ms: u64,
    /// Connect timeout when probing an existing socket.
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SandboxConfig {
    /// Run the shell through `command`.
    pub enabled: bool,
    /// Wrapper program, e.g. `firejail`.
    pub command: String,
    /// Arguments placed before the shell command line.
    pub args: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: String::new(),
            cols: 80,
            rows: 24,
            scrollback: DEFAULT_SCROLLBACK,
            shell_integration: true,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            poll_interval_ms: 1000,
            probe_timeout_ms: 1000,
        }
    }
}

impl ProxyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Configured socket path, or the per-user default.
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(crate::proxy::default_socket_path)
    }
}

impl SandboxConfig {
    /// The configured wrapper, when enabled.
    pub fn wrapper(&self) -> Option<PrefixWrapper> {
        (self.enabled && !self.command.is_empty())
            .then(|| PrefixWrapper::new(self.command.clone(), self.args.clone()))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shellbridge")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shellbridge")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SHELLBRIDGE_LOG_LEVEL: Override log level
    /// - SHELLBRIDGE_SOCKET: Override the proxy socket path
    /// - SHELLBRIDGE_SHELL: Override the shell
    ///
    /// Returns the overrides that were applied. This runs before logging is
    /// set up, so the caller reports them once it is.
    pub fn apply_env_overrides(&mut self) -> Vec<EnvOverride> {
        let mut applied = Vec::new();
        let mut read = |var: &'static str| {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty())?;
            applied.push(EnvOverride {
                var,
                value: value.clone(),
            });
            Some(value)
        };

        if let Some(level) = read("SHELLBRIDGE_LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(socket) = read("SHELLBRIDGE_SOCKET") {
            self.proxy.socket_path = Some(PathBuf::from(socket));
        }
        if let Some(shell) = read("SHELLBRIDGE_SHELL") {
            self.session.shell = shell;
        }
        applied
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (cols, rows) = (self.session.cols, self.session.rows);
        if !(1..=1000).contains(&cols) || !(1..=1000).contains(&rows) {
            return Err(ConfigError::InvalidDimensions { cols, rows });
        }

        if !(50..=60_000).contains(&self.proxy.poll_interval_ms) {
            return Err(ConfigError::InvalidPollInterval(self.proxy.poll_interval_ms));
        }

        if !(10..=30_000).contains(&self.proxy.probe_timeout_ms) {
            return Err(ConfigError::InvalidProbeTimeout(self.proxy.probe_timeout_ms));
        }

        if !self.session.shell.is_empty() && !program_exists(&self.session.shell) {
            return Err(ConfigError::InvalidShellPath(self.session.shell.clone()));
        }

        if self.sandbox.enabled {
            if self.sandbox.command.is_empty() {
                return Err(ConfigError::MissingSandboxCommand);
            }
            if !program_exists(&self.sandbox.command) {
                return Err(ConfigError::InvalidSandboxCommand(
                    self.sandbox.command.clone(),
                ));
            }
        }

        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.general.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Directory for unnamed recordings.
    pub fn recordings_dir(&self) -> PathBuf {
        self.general.data_dir.join("recordings")
    }

    /// Directory for log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.general.data_dir.join("logs")
    }
}

/// An absolute path that exists, or a name found on `PATH`.
fn program_exists(program: &str) -> bool {
    let path = Path::new(program);
    if path.is_absolute() {
        path.exists()
    } else {
        which::which(program).is_ok()
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.general.log_level, "info");
        assert!(config.general.data_dir.to_string_lossy().contains("shellbridge"));
        assert_eq!((config.session.cols, config.session.rows), (80, 24));
        assert!(config.session.shell_integration);
        assert_eq!(config.proxy.poll_interval(), Duration::from_secs(1));
        assert!(config.proxy.socket_path.is_none());
        assert!(!config.sandbox.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            [session]
            shell = "/bin/sh"
            cols = 120

            [proxy]
            socket_path = "/tmp/custom.sock"
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.session.shell, "/bin/sh");
        assert_eq!(config.session.cols, 120);
        assert_eq!(config.session.rows, 24);
        assert_eq!(config.proxy.socket_path(), PathBuf::from("/tmp/custom.sock"));
        assert_eq!(config.proxy.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.proxy.probe_timeout_ms, 1000);
    }

    #[test]
    fn test_invalid_toml_reports_position() {
        let err = Config::from_toml("[session\ncols = 1").unwrap_err();
        assert!(err.to_string().contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.general.log_level = "debug".to_string();
        config.sandbox = SandboxConfig {
            enabled: true,
            command: "env".to_string(),
            args: vec!["SANDBOXED=1".to_string()],
        };
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.session.cols = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDimensions { cols: 0, rows: 24 })
        );

        let mut config = Config::default();
        config.proxy.poll_interval_ms = 5;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPollInterval(5)));

        let mut config = Config::default();
        config.session.shell = "/definitely/not/a/shell".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidShellPath(_))
        ));

        let mut config = Config::default();
        config.sandbox.enabled = true;
        assert_eq!(config.validate(), Err(ConfigError::MissingSandboxCommand));

        let mut config = Config::default();
        config.general.log_level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }

    #[test]
    fn test_sandbox_wrapper_only_when_enabled() {
        let mut sandbox = SandboxConfig {
            enabled: false,
            command: "env".to_string(),
            args: Vec::new(),
        };
        assert!(sandbox.wrapper().is_none());
        sandbox.enabled = true;
        assert!(sandbox.wrapper().is_some());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::set_var("SHELLBRIDGE_LOG_LEVEL", "trace");
            std::env::set_var("SHELLBRIDGE_SOCKET", "/tmp/env.sock");
            std::env::set_var("SHELLBRIDGE_SHELL", "/bin/sh");
        }

        let mut config = Config::default();
        let applied = config.apply_env_overrides();

        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::remove_var("SHELLBRIDGE_LOG_LEVEL");
            std::env::remove_var("SHELLBRIDGE_SOCKET");
            std::env::remove_var("SHELLBRIDGE_SHELL");
        }

        assert_eq!(config.general.log_level, "trace");
        assert_eq!(config.proxy.socket_path(), PathBuf::from("/tmp/env.sock"));
        assert_eq!(config.session.shell, "/bin/sh");

        let vars: Vec<&str> = applied.iter().map(|o| o.var).collect();
        assert_eq!(
            vars,
            ["SHELLBRIDGE_LOG_LEVEL", "SHELLBRIDGE_SOCKET", "SHELLBRIDGE_SHELL"]
        );
        assert_eq!(applied[1].value, "/tmp/env.sock");
    }

    #[test]
    #[serial]
    fn test_empty_env_values_are_ignored() {
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::set_var("SHELLBRIDGE_SHELL", "");
            std::env::remove_var("SHELLBRIDGE_LOG_LEVEL");
            std::env::remove_var("SHELLBRIDGE_SOCKET");
        }

        let mut config = Config::default();
        let applied = config.apply_env_overrides();

        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::remove_var("SHELLBRIDGE_SHELL");
        }

        assert!(applied.is_empty());
        assert_eq!(config, Config::default());
    }
}
