//! Startup posture selection.

use thiserror::Error;

use crate::session::hooks::SESSION_ENV;

/// How this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Own a session and pipe the user's terminal into it.
    Interactive,
    /// Speak MCP on stdio and forward tool calls to the owning instance.
    Detached,
    /// Own a session driven by a host application over stdio.
    Embedded,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error(
        "already running inside a shellbridge session ({SESSION_ENV} is set); \
         use --mcp to connect to it instead"
    )]
    NestedSession,
}

/// Facts the choice depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeInputs {
    pub stdin_is_tty: bool,
    pub force_mcp: bool,
    pub embedded: bool,
    pub inside_session: bool,
}

impl ModeInputs {
    /// Read TTY-ness and the session marker from the environment.
    pub fn detect(force_mcp: bool, embedded: bool) -> Self {
        use std::io::IsTerminal;
        Self {
            stdin_is_tty: std::io::stdin().is_terminal(),
            force_mcp,
            embedded,
            inside_session: std::env::var_os(SESSION_ENV).is_some(),
        }
    }
}

/// Pick the posture. Only the interactive posture is refused inside a
/// session.
pub fn select_mode(inputs: ModeInputs) -> Result<Mode, ModeError> {
    if inputs.embedded {
        return Ok(Mode::Embedded);
    }
    if inputs.force_mcp || !inputs.stdin_is_tty {
        return Ok(Mode::Detached);
    }
    if inputs.inside_session {
        return Err(ModeError::NestedSession);
    }
    Ok(Mode::Interactive)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tty() -> ModeInputs {
        ModeInputs {
            stdin_is_tty: true,
            ..ModeInputs::default()
        }
    }

    #[test]
    fn test_tty_without_flags_is_interactive() {
        assert_eq!(select_mode(tty()), Ok(Mode::Interactive));
    }

    #[test]
    fn test_piped_stdin_is_detached() {
        assert_eq!(select_mode(ModeInputs::default()), Ok(Mode::Detached));
    }

    #[test]
    fn test_flags_win_over_tty() {
        let mcp = ModeInputs {
            force_mcp: true,
            ..tty()
        };
        assert_eq!(select_mode(mcp), Ok(Mode::Detached));

        let embedded = ModeInputs {
            embedded: true,
            force_mcp: true,
            ..tty()
        };
        assert_eq!(select_mode(embedded), Ok(Mode::Embedded));
    }

    #[test]
    fn test_nested_interactive_is_refused() {
        let nested = ModeInputs {
            inside_session: true,
            ..tty()
        };
        assert_eq!(select_mode(nested), Err(ModeError::NestedSession));
    }

    #[test]
    fn test_detached_is_allowed_inside_session() {
        let nested = ModeInputs {
            inside_session: true,
            force_mcp: true,
            ..tty()
        };
        assert_eq!(select_mode(nested), Ok(Mode::Detached));

        let piped = ModeInputs {
            inside_session: true,
            ..ModeInputs::default()
        };
        assert_eq!(select_mode(piped), Ok(Mode::Detached));
    }
}
