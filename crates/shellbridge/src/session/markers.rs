//! Shell-integration marker tracking.
//!
//! The injected startup hooks make the shell emit two kinds of OSC
//! sequences on every prompt:
//!
//! - `OSC 133 ; A|B|C|D[;exit]` prompt/command boundaries (FinalTerm style)
//! - `OSC 7 ; file://host/path` the current working directory
//!
//! vt100 ignores both, so the session scans the raw stream for them. The
//! scanner keeps its state across calls, so markers split between reads are
//! still recognised.

use std::path::PathBuf;

use url::Url;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// OSC payloads longer than this are not markers and are dropped.
const MAX_OSC_LEN: usize = 4096;

/// What the shell has reported about itself so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellState {
    /// Directory from the latest `OSC 7`.
    pub cwd: Option<PathBuf>,
    /// Exit code from the latest `OSC 133;D`.
    pub last_exit_code: Option<i32>,
    /// Number of prompts shown (`OSC 133;A`).
    pub prompts: u64,
    /// A command was started (`OSC 133;C`) and has not finished yet.
    pub command_running: bool,
}

#[derive(Debug)]
enum ScanState {
    Ground,
    Escape,
    Osc,
    OscEscape,
}

/// Incremental scanner for shell-integration OSC sequences.
#[derive(Debug)]
pub struct MarkerScanner {
    scan: ScanState,
    payload: Vec<u8>,
    overflow: bool,
    state: ShellState,
}

impl Default for MarkerScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self {
            scan: ScanState::Ground,
            payload: Vec::new(),
            overflow: false,
            state: ShellState::default(),
        }
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    /// Scan a chunk of output.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.scan = match self.scan {
                ScanState::Ground if byte == ESC => ScanState::Escape,
                ScanState::Ground => ScanState::Ground,
                ScanState::Escape if byte == b']' => {
                    self.payload.clear();
                    self.overflow = false;
                    ScanState::Osc
                }
                ScanState::Escape if byte == ESC => ScanState::Escape,
                ScanState::Escape => ScanState::Ground,
                ScanState::Osc if byte == BEL => {
                    self.finish();
                    ScanState::Ground
                }
                ScanState::Osc if byte == ESC => ScanState::OscEscape,
                ScanState::Osc => {
                    self.push(byte);
                    ScanState::Osc
                }
                ScanState::OscEscape if byte == b'\\' => {
                    self.finish();
                    ScanState::Ground
                }
                // Anything else aborts the OSC; the ESC may start a new one.
                ScanState::OscEscape if byte == b']' => {
                    self.payload.clear();
                    self.overflow = false;
                    ScanState::Osc
                }
                ScanState::OscEscape => ScanState::Ground,
            };
        }
    }

    fn push(&mut self, byte: u8) {
        if self.payload.len() < MAX_OSC_LEN {
            self.payload.push(byte);
        } else {
            self.overflow = true;
        }
    }

    fn finish(&mut self) {
        if self.overflow {
            return;
        }
        let Ok(payload) = std::str::from_utf8(&self.payload) else {
            return;
        };
        let payload = payload.to_string();
        self.apply(&payload);
    }

    fn apply(&mut self, payload: &str) {
        if let Some(rest) = payload.strip_prefix("133;") {
            let mut parts = rest.split(';');
            match parts.next() {
                Some("A") => {
                    self.state.prompts += 1;
                    self.state.command_running = false;
                }
                Some("C") => self.state.command_running = true,
                Some("D") => {
                    self.state.command_running = false;
                    if let Some(code) = parts.next().and_then(|c| c.trim().parse().ok()) {
                        self.state.last_exit_code = Some(code);
                    }
                }
                _ => {}
            }
        } else if let Some(url) = payload.strip_prefix("7;") {
            if let Some(path) = parse_file_url(url) {
                self.state.cwd = Some(path);
            }
        }
    }
}

/// Extract the local path from `file://host/path`.
fn parse_file_url(raw: &str) -> Option<PathBuf> {
    let url = Url::parse(raw).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    // The reporting host names this machine; only the path matters here.
    let mut local = Url::parse("file:///").ok()?;
    local.set_path(url.path());
    local.to_file_path().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_and_exit_code() {
        let mut scanner = MarkerScanner::new();
        scanner.feed(b"\x1b]133;A\x07$ ");
        scanner.feed(b"false\r\n\x1b]133;C\x07");
        assert!(scanner.state().command_running);

        scanner.feed(b"\x1b]133;D;1\x07\x1b]133;A\x07$ ");
        let state = scanner.state();
        assert_eq!(state.last_exit_code, Some(1));
        assert_eq!(state.prompts, 2);
        assert!(!state.command_running);
    }

    #[test]
    fn test_cwd_report_with_st_terminator() {
        let mut scanner = MarkerScanner::new();
        scanner.feed(b"\x1b]7;file://myhost/home/me/my%20project\x1b\\");
        assert_eq!(
            scanner.state().cwd,
            Some(PathBuf::from("/home/me/my project"))
        );
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let mut scanner = MarkerScanner::new();
        let stream = b"out\x1b]133;D;127\x07\x1b]7;file:///tmp\x07";
        for byte in stream {
            scanner.feed(std::slice::from_ref(byte));
        }
        assert_eq!(scanner.state().last_exit_code, Some(127));
        assert_eq!(scanner.state().cwd, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_other_sequences_are_ignored() {
        let mut scanner = MarkerScanner::new();
        scanner.feed(b"\x1b[1;31mred\x1b[0m\x1b]0;title\x07\x1b]133;Z\x07");
        assert_eq!(scanner.state(), &ShellState::default());
    }

    #[test]
    fn test_overlong_osc_is_dropped() {
        let mut scanner = MarkerScanner::new();
        let mut stream = b"\x1b]7;file:///".to_vec();
        stream.extend(std::iter::repeat(b'a').take(MAX_OSC_LEN + 10));
        stream.push(BEL);
        scanner.feed(&stream);
        assert_eq!(scanner.state().cwd, None);

        scanner.feed(b"\x1b]7;file:///ok\x07");
        assert_eq!(scanner.state().cwd, Some(PathBuf::from("/ok")));
    }

    #[test]
    fn test_file_url_decoding() {
        assert_eq!(
            parse_file_url("file://host/a%2Fb%zz%+1"),
            Some(PathBuf::from("/a/b%zz%+1"))
        );
        assert_eq!(
            parse_file_url("file:///srv/caf%C3%A9"),
            Some(PathBuf::from("/srv/café"))
        );
        assert_eq!(parse_file_url("http://host/tmp"), None);
        assert_eq!(parse_file_url("not a url"), None);
    }
}
