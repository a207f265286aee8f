//! Shell startup injection.
//!
//! Each supported shell gets a small startup script that first sources the
//! user's own configuration and then installs prompt hooks emitting
//! `OSC 133` prompt markers and an `OSC 7` working-directory report. The
//! scripts live in a temporary directory that is removed when the returned
//! [`ShellLaunch`] is dropped.

use std::fs;
use std::io;
use std::path::Path;

use tempfile::TempDir;

/// Environment variable carrying the session id into the shell.
pub const SESSION_ENV: &str = "SHELLBRIDGE_SESSION";

/// Where the zsh hooks find the user's real `ZDOTDIR`.
const USER_ZDOTDIR_ENV: &str = "SHELLBRIDGE_USER_ZDOTDIR";

const BASH_RC: &str = r#"# shellbridge bash integration
if [ -f /etc/bash.bashrc ]; then . /etc/bash.bashrc; fi
if [ -f "$HOME/.bashrc" ]; then . "$HOME/.bashrc"; fi

__shellbridge_prompt() {
    local ec=$?
    printf '\033]133;D;%s\007\033]7;file://%s%s\007\033]133;A\007' "$ec" "${HOSTNAME-}" "$PWD"
    return $ec
}
PROMPT_COMMAND="__shellbridge_prompt${PROMPT_COMMAND:+;$PROMPT_COMMAND}"
PS0="${PS0-}"$'\033]133;C\007'
"#;

const ZSH_ENV: &str = r#"# shellbridge zsh integration
__shellbridge_hooks="$ZDOTDIR"
ZDOTDIR="${SHELLBRIDGE_USER_ZDOTDIR:-$HOME}"
if [ -f "$ZDOTDIR/.zshenv" ]; then . "$ZDOTDIR/.zshenv"; fi
SHELLBRIDGE_USER_ZDOTDIR="$ZDOTDIR"
ZDOTDIR="$__shellbridge_hooks"
"#;

const ZSH_RC: &str = r#"# shellbridge zsh integration
ZDOTDIR="$SHELLBRIDGE_USER_ZDOTDIR"
unset SHELLBRIDGE_USER_ZDOTDIR
if [ -f "$ZDOTDIR/.zshrc" ]; then . "$ZDOTDIR/.zshrc"; fi
case "${HISTFILE-}" in
    "$__shellbridge_hooks"/*) HISTFILE="$ZDOTDIR/.zsh_history" ;;
esac
unset __shellbridge_hooks

autoload -Uz add-zsh-hook
__shellbridge_precmd() {
    local ec=$?
    printf '\033]133;D;%s\007\033]7;file://%s%s\007\033]133;A\007' "$ec" "${HOST-}" "$PWD"
}
__shellbridge_preexec() {
    printf '\033]133;C\007'
}
add-zsh-hook precmd __shellbridge_precmd
add-zsh-hook preexec __shellbridge_preexec
"#;

const FISH_INIT: &str = "function __shellbridge_postexec --on-event fish_postexec; \
printf '\\e]133;D;%s\\a' $status; end; \
function __shellbridge_preexec --on-event fish_preexec; printf '\\e]133;C\\a'; end; \
function __shellbridge_prompt --on-event fish_prompt; \
printf '\\e]7;file://%s%s\\a\\e]133;A\\a' $hostname $PWD; end";

/// Shell families with known startup hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
    Other,
}

impl ShellKind {
    /// Classify a shell by its program name.
    pub fn detect(program: &str) -> Self {
        let name = Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(program)
            .trim_start_matches('-');
        match name {
            "bash" => ShellKind::Bash,
            "zsh" => ShellKind::Zsh,
            "fish" => ShellKind::Fish,
            _ => ShellKind::Other,
        }
    }
}

/// Everything needed to start the shell with integration installed.
#[derive(Debug)]
pub struct ShellLaunch {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub kind: ShellKind,
    hooks_dir: Option<TempDir>,
}

impl ShellLaunch {
    /// Directory holding the injected startup files, if any.
    pub fn hooks_dir(&self) -> Option<&Path> {
        self.hooks_dir.as_ref().map(|d| d.path())
    }

    /// Take ownership of the temp dir so it lives as long as the session.
    pub fn take_hooks_dir(&mut self) -> Option<TempDir> {
        self.hooks_dir.take()
    }
}

/// Build the launch plan for `program`.
///
/// With `integration` off, or for an unknown shell, the shell starts
/// unmodified apart from the session environment.
pub fn prepare(program: &str, session_id: &str, integration: bool) -> io::Result<ShellLaunch> {
    let kind = ShellKind::detect(program);
    let mut launch = ShellLaunch {
        program: program.to_string(),
        args: Vec::new(),
        env: vec![
            (SESSION_ENV.to_string(), session_id.to_string()),
            ("TERM".to_string(), "xterm-256color".to_string()),
        ],
        kind,
        hooks_dir: None,
    };
    if !integration {
        return Ok(launch);
    }

    match kind {
        ShellKind::Bash => {
            let dir = hooks_tempdir()?;
            let rc = dir.path().join("bashrc");
            fs::write(&rc, BASH_RC)?;
            launch.args = vec!["--rcfile".to_string(), rc.to_string_lossy().into_owned()];
            launch.hooks_dir = Some(dir);
        }
        ShellKind::Zsh => {
            let dir = hooks_tempdir()?;
            fs::write(dir.path().join(".zshenv"), ZSH_ENV)?;
            fs::write(dir.path().join(".zshrc"), ZSH_RC)?;
            if let Ok(user_zdotdir) = std::env::var("ZDOTDIR") {
                launch.env.push((USER_ZDOTDIR_ENV.to_string(), user_zdotdir));
            }
            launch.env.push((
                "ZDOTDIR".to_string(),
                dir.path().to_string_lossy().into_owned(),
            ));
            launch.hooks_dir = Some(dir);
        }
        ShellKind::Fish => {
            launch.args = vec!["--init-command".to_string(), FISH_INIT.to_string()];
        }
        ShellKind::Other => {}
    }

    tracing::debug!(
        shell = %program,
        kind = ?kind,
        hooks_dir = ?launch.hooks_dir(),
        "Prepared shell launch"
    );
    Ok(launch)
}

fn hooks_tempdir() -> io::Result<TempDir> {
    tempfile::Builder::new().prefix("shellbridge-").tempdir()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_value<'a>(launch: &'a ShellLaunch, key: &str) -> Option<&'a str> {
        launch
            .env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_detect_shell_kind() {
        assert_eq!(ShellKind::detect("/bin/bash"), ShellKind::Bash);
        assert_eq!(ShellKind::detect("-zsh"), ShellKind::Zsh);
        assert_eq!(ShellKind::detect("/usr/local/bin/fish"), ShellKind::Fish);
        assert_eq!(ShellKind::detect("/bin/sh"), ShellKind::Other);
    }

    #[test]
    fn test_session_env_always_present() {
        let launch = prepare("/bin/sh", "abc", true).unwrap();
        assert_eq!(env_value(&launch, SESSION_ENV), Some("abc"));
        assert_eq!(env_value(&launch, "TERM"), Some("xterm-256color"));
        assert!(launch.args.is_empty());
        assert!(launch.hooks_dir().is_none());
    }

    #[test]
    fn test_bash_rcfile_sources_user_config_first() {
        let launch = prepare("/bin/bash", "abc", true).unwrap();
        assert_eq!(launch.args[0], "--rcfile");
        let rc = fs::read_to_string(&launch.args[1]).unwrap();
        let source = rc.find(".bashrc\"; fi").unwrap();
        let hook = rc.find("PROMPT_COMMAND=").unwrap();
        assert!(source < hook);
        assert!(rc.contains("133;D"));
        assert!(rc.contains("]7;file://"));
    }

    #[test]
    fn test_bash_keeps_user_history_settings() {
        let Ok(bash) = which::which("bash") else {
            return;
        };
        let home = tempfile::tempdir().unwrap();
        let custom = home.path().join("custom_history");
        fs::write(
            home.path().join(".bashrc"),
            format!("HISTFILE=\"{}\"\n", custom.display()),
        )
        .unwrap();

        let launch = prepare(&bash.to_string_lossy(), "abc", true).unwrap();
        let output = std::process::Command::new(&bash)
            .args(&launch.args)
            .args(["-i", "-c", "echo HF=$HISTFILE"])
            .env("HOME", home.path())
            .env_remove("HISTFILE")
            .stdin(std::process::Stdio::null())
            .output()
            .unwrap();
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(
            stdout.contains(&format!("HF={}", custom.display())),
            "unexpected output: {stdout}"
        );
    }

    #[test]
    fn test_zsh_uses_zdotdir() {
        let launch = prepare("zsh", "abc", true).unwrap();
        let dir = env_value(&launch, "ZDOTDIR").unwrap();
        assert!(Path::new(dir).join(".zshrc").exists());
        assert!(Path::new(dir).join(".zshenv").exists());
        assert_eq!(Some(Path::new(dir)), launch.hooks_dir());
    }

    #[test]
    fn test_fish_needs_no_files() {
        let launch = prepare("fish", "abc", true).unwrap();
        assert_eq!(launch.args[0], "--init-command");
        assert!(launch.args[1].contains("fish_prompt"));
        assert!(launch.hooks_dir().is_none());
    }

    #[test]
    fn test_integration_disabled() {
        let launch = prepare("/bin/bash", "abc", false).unwrap();
        assert!(launch.args.is_empty());
        assert!(launch.hooks_dir().is_none());
    }

    #[test]
    fn test_hooks_dir_removed_on_drop() {
        let launch = prepare("/bin/bash", "abc", true).unwrap();
        let dir = launch.hooks_dir().unwrap().to_path_buf();
        assert!(dir.exists());
        drop(launch);
        assert!(!dir.exists());
    }
}
