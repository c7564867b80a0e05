//! Key event encoding
//!
//! Translates crossterm key events into the byte sequences a remote shell
//! expects, the same way a browser terminal would.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Ctrl+] leaves the session, as in telnet
pub fn is_detach(key: &KeyEvent) -> bool {
    key.kind != KeyEventKind::Release
        && key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char(']') | KeyCode::Char('5'))
}

/// Encode one key press; `None` for keys with no terminal meaning
pub fn encode_key(key: KeyEvent) -> Option<String> {
    if key.kind == KeyEventKind::Release {
        return None;
    }

    let mut out = String::new();
    if key.modifiers.contains(KeyModifiers::ALT) {
        out.push('\x1b');
    }

    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let lower = c.to_ascii_lowercase();
            match lower {
                'a'..='z' => out.push(((lower as u8 - b'a') + 1) as char),
                ' ' | '@' => out.push('\0'),
                '[' => out.push('\x1b'),
                '\\' => out.push('\x1c'),
                _ => return None,
            }
        }
        KeyCode::Char(c) => out.push(c),
        KeyCode::Enter => out.push('\r'),
        KeyCode::Tab => out.push('\t'),
        KeyCode::BackTab => out.push_str("\x1b[Z"),
        KeyCode::Backspace => out.push('\x7f'),
        KeyCode::Esc => out.push('\x1b'),
        KeyCode::Up => out.push_str("\x1b[A"),
        KeyCode::Down => out.push_str("\x1b[B"),
        KeyCode::Right => out.push_str("\x1b[C"),
        KeyCode::Left => out.push_str("\x1b[D"),
        KeyCode::Home => out.push_str("\x1b[H"),
        KeyCode::End => out.push_str("\x1b[F"),
        KeyCode::PageUp => out.push_str("\x1b[5~"),
        KeyCode::PageDown => out.push_str("\x1b[6~"),
        KeyCode::Delete => out.push_str("\x1b[3~"),
        KeyCode::Insert => out.push_str("\x1b[2~"),
        _ => return None,
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test_case(KeyCode::Char('l'), KeyModifiers::NONE, "l" ; "plain char")]
    #[test_case(KeyCode::Char('é'), KeyModifiers::NONE, "é" ; "non ascii char")]
    #[test_case(KeyCode::Char('c'), KeyModifiers::CONTROL, "\x03" ; "ctrl c")]
    #[test_case(KeyCode::Char('D'), KeyModifiers::CONTROL, "\x04" ; "ctrl shift d")]
    #[test_case(KeyCode::Char('b'), KeyModifiers::ALT, "\x1bb" ; "alt b")]
    #[test_case(KeyCode::Enter, KeyModifiers::NONE, "\r" ; "enter")]
    #[test_case(KeyCode::Backspace, KeyModifiers::NONE, "\x7f" ; "backspace")]
    #[test_case(KeyCode::Up, KeyModifiers::NONE, "\x1b[A" ; "arrow up")]
    #[test_case(KeyCode::Delete, KeyModifiers::NONE, "\x1b[3~" ; "delete")]
    fn test_encode_key(code: KeyCode, modifiers: KeyModifiers, expected: &str) {
        assert_eq!(encode_key(key(code, modifiers)).as_deref(), Some(expected));
    }

    #[test]
    fn test_unmapped_keys_are_dropped() {
        assert_eq!(encode_key(key(KeyCode::F(5), KeyModifiers::NONE)), None);
        assert_eq!(encode_key(key(KeyCode::Char('1'), KeyModifiers::CONTROL)), None);
    }

    #[test]
    fn test_detach_chord() {
        assert!(is_detach(&key(KeyCode::Char(']'), KeyModifiers::CONTROL)));
        assert!(!is_detach(&key(KeyCode::Char(']'), KeyModifiers::NONE)));
    }
}
