//! Key events to terminal input.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Encode a key press the way a terminal would send it to a shell.
pub fn key_to_input(key: &KeyEvent) -> Option<String> {
    let seq = match key.code {
        KeyCode::Char(c) => {
            if key.modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() {
                // Ctrl+A through Ctrl+Z
                let ctrl = (c.to_ascii_lowercase() as u8) - b'a' + 1;
                return Some(char::from(ctrl).to_string());
            }
            return Some(c.to_string());
        }
        KeyCode::Enter => "\r",
        KeyCode::Backspace => "\x7f",
        KeyCode::BackTab => "\x1b[Z",
        KeyCode::Esc => "\x1b",
        KeyCode::Up => "\x1b[A",
        KeyCode::Down => "\x1b[B",
        KeyCode::Right => "\x1b[C",
        KeyCode::Left => "\x1b[D",
        KeyCode::Home => "\x1b[H",
        KeyCode::End => "\x1b[F",
        KeyCode::PageUp => "\x1b[5~",
        KeyCode::PageDown => "\x1b[6~",
        KeyCode::Delete => "\x1b[3~",
        KeyCode::Insert => "\x1b[2~",
        KeyCode::F(n) => match n {
            1 => "\x1bOP",
            2 => "\x1bOQ",
            3 => "\x1bOR",
            4 => "\x1bOS",
            5 => "\x1b[15~",
            6 => "\x1b[17~",
            7 => "\x1b[18~",
            8 => "\x1b[19~",
            9 => "\x1b[20~",
            10 => "\x1b[21~",
            11 => "\x1b[23~",
            12 => "\x1b[24~",
            _ => return None,
        },
        _ => return None,
    };
    Some(seq.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_printable_and_control() {
        assert_eq!(key_to_input(&key(KeyCode::Char('@'), KeyModifiers::SHIFT)).as_deref(), Some("@"));
        assert_eq!(key_to_input(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)).as_deref(), Some("\x03"));
        assert_eq!(key_to_input(&key(KeyCode::Enter, KeyModifiers::NONE)).as_deref(), Some("\r"));
        assert_eq!(key_to_input(&key(KeyCode::Backspace, KeyModifiers::NONE)).as_deref(), Some("\x7f"));
    }

    #[test]
    fn test_unmapped_keys() {
        assert_eq!(key_to_input(&key(KeyCode::F(20), KeyModifiers::NONE)), None);
        assert_eq!(key_to_input(&key(KeyCode::Null, KeyModifiers::NONE)), None);
    }
}
