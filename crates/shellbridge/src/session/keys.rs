//! Key chord encoding.
//!
//! Turns chord strings such as `"ctrl+c"`, `"alt+b"`, `"shift+tab"` or
//! `"pageup"` into the bytes an xterm-compatible terminal would send, so the
//! shell cannot tell a tool-sent key from a typed one. Chords are parsed into
//! crossterm key codes and modifiers, the same vocabulary the interactive
//! driver reads from the human's terminal.

use crossterm::event::{KeyCode, KeyModifiers};

/// A chord that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized key: {0:?}")]
pub struct InvalidKey(pub String);

/// Parsed chord: one key plus modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

/// Parse a chord string.
///
/// A lone character (including `+`) is taken literally with its case kept.
/// Otherwise parts are split on `+` and matched case-insensitively.
pub fn parse_chord(input: &str) -> Result<KeyChord, InvalidKey> {
    let invalid = || InvalidKey(input.to_string());

    let mut chars = input.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        return Ok(KeyChord {
            code: KeyCode::Char(ch),
            modifiers: KeyModifiers::NONE,
        });
    }

    let mut modifiers = KeyModifiers::NONE;
    let mut code = None;
    for part in input.trim().split('+').map(str::trim) {
        if part.is_empty() {
            return Err(invalid());
        }
        match part.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "alt" | "meta" | "option" => modifiers |= KeyModifiers::ALT,
            "shift" => modifiers |= KeyModifiers::SHIFT,
            _ => {
                if code.is_some() {
                    return Err(invalid());
                }
                code = Some(parse_key(part).ok_or_else(invalid)?);
            }
        }
    }

    let code = code.ok_or_else(invalid)?;
    Ok(KeyChord { code, modifiers })
}

fn parse_key(key: &str) -> Option<KeyCode> {
    let lower = key.to_ascii_lowercase();
    let code = match lower.as_str() {
        "enter" | "return" | "cr" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "backspace" | "bs" => KeyCode::Backspace,
        "esc" | "escape" => KeyCode::Esc,
        "space" | "spacebar" => KeyCode::Char(' '),
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" | "pgup" => KeyCode::PageUp,
        "pagedown" | "pgdn" => KeyCode::PageDown,
        "insert" | "ins" => KeyCode::Insert,
        "delete" | "del" => KeyCode::Delete,
        _ => {
            if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                return (1..=12).contains(&n).then_some(KeyCode::F(n));
            }
            let mut chars = key.chars();
            let ch = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            KeyCode::Char(ch)
        }
    };
    Some(code)
}

/// Encode a chord string into terminal input bytes.
pub fn encode_key(input: &str) -> Result<Vec<u8>, InvalidKey> {
    let chord = parse_chord(input)?;
    chord_to_bytes(chord).ok_or_else(|| InvalidKey(input.to_string()))
}

/// Encode a parsed chord.
pub fn chord_to_bytes(chord: KeyChord) -> Option<Vec<u8>> {
    let modifiers = chord.modifiers;
    let bytes = match chord.code {
        KeyCode::Char(ch) => return encode_char(ch, modifiers),
        KeyCode::Enter => with_alt_prefix(modifiers, vec![b'\r']),
        KeyCode::Tab if modifiers.contains(KeyModifiers::SHIFT) => {
            with_alt_prefix(modifiers, b"\x1b[Z".to_vec())
        }
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Tab => with_alt_prefix(modifiers, vec![b'\t']),
        KeyCode::Backspace if modifiers.contains(KeyModifiers::CONTROL) => {
            with_alt_prefix(modifiers, vec![0x08])
        }
        KeyCode::Backspace => with_alt_prefix(modifiers, vec![0x7f]),
        KeyCode::Esc => with_alt_prefix(modifiers, vec![0x1b]),
        KeyCode::Up => encode_csi_key(modifiers, 'A'),
        KeyCode::Down => encode_csi_key(modifiers, 'B'),
        KeyCode::Right => encode_csi_key(modifiers, 'C'),
        KeyCode::Left => encode_csi_key(modifiers, 'D'),
        KeyCode::Home => encode_csi_key(modifiers, 'H'),
        KeyCode::End => encode_csi_key(modifiers, 'F'),
        KeyCode::Insert => encode_csi_tilde_key(modifiers, 2),
        KeyCode::Delete => encode_csi_tilde_key(modifiers, 3),
        KeyCode::PageUp => encode_csi_tilde_key(modifiers, 5),
        KeyCode::PageDown => encode_csi_tilde_key(modifiers, 6),
        KeyCode::F(n @ 1..=4) => {
            let final_byte = (b'P' + (n - 1)) as char;
            match modifier_param(modifiers) {
                Some(param) => format!("\x1b[1;{param}{final_byte}").into_bytes(),
                None => format!("\x1bO{final_byte}").into_bytes(),
            }
        }
        KeyCode::F(n @ 5..=12) => {
            let code = match n {
                5 => 15,
                6 => 17,
                7 => 18,
                8 => 19,
                9 => 20,
                10 => 21,
                11 => 23,
                _ => 24,
            };
            encode_csi_tilde_key(modifiers, code)
        }
        _ => return None,
    };
    Some(bytes)
}

fn encode_char(ch: char, modifiers: KeyModifiers) -> Option<Vec<u8>> {
    let bytes = if modifiers.contains(KeyModifiers::CONTROL) {
        vec![control_char_byte(ch)?]
    } else {
        let ch = if modifiers.contains(KeyModifiers::SHIFT) {
            ch.to_ascii_uppercase()
        } else {
            ch
        };
        let mut buffer = [0u8; 4];
        ch.encode_utf8(&mut buffer).as_bytes().to_vec()
    };
    Some(with_alt_prefix(modifiers, bytes))
}

fn control_char_byte(ch: char) -> Option<u8> {
    match ch {
        ' ' | '@' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '-' | '7' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => {
            let lower = ch.to_ascii_lowercase();
            lower
                .is_ascii_lowercase()
                .then(|| (lower as u8 - b'a') + 1)
        }
    }
}

fn with_alt_prefix(modifiers: KeyModifiers, bytes: Vec<u8>) -> Vec<u8> {
    if !modifiers.contains(KeyModifiers::ALT) {
        return bytes;
    }
    let mut prefixed = Vec::with_capacity(bytes.len() + 1);
    prefixed.push(0x1b);
    prefixed.extend(bytes);
    prefixed
}

fn modifier_param(modifiers: KeyModifiers) -> Option<u8> {
    let mut value = 1;
    if modifiers.contains(KeyModifiers::SHIFT) {
        value += 1;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        value += 2;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        value += 4;
    }
    (value > 1).then_some(value)
}

fn encode_csi_key(modifiers: KeyModifiers, final_byte: char) -> Vec<u8> {
    match modifier_param(modifiers) {
        Some(param) => format!("\x1b[1;{param}{final_byte}").into_bytes(),
        None => format!("\x1b[{final_byte}").into_bytes(),
    }
}

fn encode_csi_tilde_key(modifiers: KeyModifiers, code: u8) -> Vec<u8> {
    match modifier_param(modifiers) {
        Some(param) => format!("\x1b[{code};{param}~").into_bytes(),
        None => format!("\x1b[{code}~").into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_letters() {
        assert_eq!(encode_key("ctrl+c").unwrap(), vec![0x03]);
        assert_eq!(encode_key("Ctrl+D").unwrap(), vec![0x04]);
        assert_eq!(encode_key("ctrl+[").unwrap(), vec![0x1b]);
        assert_eq!(encode_key("ctrl+space").unwrap(), vec![0x00]);
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(encode_key("enter").unwrap(), b"\r");
        assert_eq!(encode_key("tab").unwrap(), b"\t");
        assert_eq!(encode_key("shift+tab").unwrap(), b"\x1b[Z");
        assert_eq!(encode_key("escape").unwrap(), b"\x1b");
        assert_eq!(encode_key("backspace").unwrap(), vec![0x7f]);
        assert_eq!(encode_key("up").unwrap(), b"\x1b[A");
        assert_eq!(encode_key("pageup").unwrap(), b"\x1b[5~");
        assert_eq!(encode_key("delete").unwrap(), b"\x1b[3~");
    }

    #[test]
    fn test_modified_cursor_keys() {
        assert_eq!(encode_key("ctrl+left").unwrap(), b"\x1b[1;5D");
        assert_eq!(encode_key("shift+up").unwrap(), b"\x1b[1;2A");
        assert_eq!(encode_key("alt+pagedown").unwrap(), b"\x1b[6;3~");
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(encode_key("f1").unwrap(), b"\x1bOP");
        assert_eq!(encode_key("F5").unwrap(), b"\x1b[15~");
        assert_eq!(encode_key("f12").unwrap(), b"\x1b[24~");
        assert_eq!(encode_key("ctrl+f2").unwrap(), b"\x1b[1;5Q");
        assert!(encode_key("f13").is_err());
    }

    #[test]
    fn test_alt_prefix() {
        assert_eq!(encode_key("alt+b").unwrap(), b"\x1bb");
        assert_eq!(encode_key("alt+enter").unwrap(), b"\x1b\r");
    }

    #[test]
    fn test_single_characters_are_literal() {
        assert_eq!(encode_key("q").unwrap(), b"q");
        assert_eq!(encode_key("Q").unwrap(), b"Q");
        assert_eq!(encode_key("+").unwrap(), b"+");
        assert_eq!(encode_key("é").unwrap(), "é".as_bytes());
        assert_eq!(encode_key("shift+a").unwrap(), b"A");
    }

    #[test]
    fn test_invalid_chords() {
        assert!(encode_key("").is_err());
        assert!(encode_key("ctrl+").is_err());
        assert!(encode_key("ctrl").is_err());
        assert!(encode_key("a+b").is_err());
        assert!(encode_key("hyper+x").is_err());
        assert_eq!(
            encode_key("nonsense").unwrap_err(),
            InvalidKey("nonsense".to_string())
        );
    }
}
