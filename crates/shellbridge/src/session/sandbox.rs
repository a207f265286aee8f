//! Command wrapping for sandboxed sessions.
//!
//! The session never implements isolation itself. It hands the shell command
//! line to a [`CommandWrapper`], which may rewrite it (for example to run the
//! shell under `bwrap` or `sandbox-exec`), and tears the wrapper down when the
//! session manager is disposed.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while preparing a wrapped command.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The wrapper program could not be found.
    #[error("sandbox program not available: {0}")]
    NotAvailable(String),

    /// The wrapper refused or failed to wrap the command.
    #[error("failed to wrap command: {0}")]
    WrapFailed(String),
}

/// A command line ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Rewrites the shell command line before the session spawns it.
#[async_trait]
pub trait CommandWrapper: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Wrap `program args...` into the command that actually runs.
    async fn wrap(&self, program: &str, args: &[String]) -> Result<WrappedCommand, SandboxError>;

    /// Release anything the wrapper set up.
    async fn teardown(&self) {}
}

/// Runs the shell as the trailing arguments of a fixed launcher command.
///
/// `PrefixWrapper::new("bwrap", ["--ro-bind", "/", "/", "--"])` turns
/// `bash --rcfile x` into `bwrap --ro-bind / / -- bash --rcfile x`.
#[derive(Debug, Clone)]
pub struct PrefixWrapper {
    program: String,
    args: Vec<String>,
}

impl PrefixWrapper {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Check that the launcher exists on `PATH`.
    pub fn validate(&self) -> Result<(), SandboxError> {
        which::which(&self.program)
            .map(|_| ())
            .map_err(|e| SandboxError::NotAvailable(format!("{}: {}", self.program, e)))
    }
}

#[async_trait]
impl CommandWrapper for PrefixWrapper {
    fn name(&self) -> &str {
        &self.program
    }

    async fn wrap(&self, program: &str, args: &[String]) -> Result<WrappedCommand, SandboxError> {
        if program.is_empty() {
            return Err(SandboxError::WrapFailed("empty program".to_string()));
        }
        let mut wrapped_args = self.args.clone();
        wrapped_args.push(program.to_string());
        wrapped_args.extend(args.iter().cloned());
        Ok(WrappedCommand {
            program: self.program.clone(),
            args: wrapped_args,
        })
    }

    async fn teardown(&self) {
        tracing::debug!(wrapper = %self.program, "Sandbox wrapper released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_wrapper_wraps_command() {
        let wrapper = PrefixWrapper::new("env", ["-i", "--"]);
        let wrapped = wrapper
            .wrap("/bin/bash", &["--rcfile".to_string(), "/tmp/rc".to_string()])
            .await
            .unwrap();
        assert_eq!(wrapped.program, "env");
        assert_eq!(wrapped.args, vec!["-i", "--", "/bin/bash", "--rcfile", "/tmp/rc"]);
    }

    #[tokio::test]
    async fn test_prefix_wrapper_rejects_empty_program() {
        let wrapper = PrefixWrapper::new("env", Vec::<String>::new());
        assert!(matches!(
            wrapper.wrap("", &[]).await,
            Err(SandboxError::WrapFailed(_))
        ));
    }

    #[test]
    fn test_validate_missing_program() {
        let wrapper = PrefixWrapper::new("definitely-not-a-real-sandbox-tool", Vec::<String>::new());
        assert!(matches!(
            wrapper.validate(),
            Err(SandboxError::NotAvailable(_))
        ));
    }

    #[test]
    fn test_validate_existing_program() {
        let wrapper = PrefixWrapper::new("sh", Vec::<String>::new());
        assert!(wrapper.validate().is_ok());
    }
}
