//! Key-name and mouse-button tables.
//!
//! Key names are case-insensitive. Any single character is a character key;
//! longer names must appear in the named-key table. Combos join keys with
//! `+` (`ctrl+shift+a`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named, non-character key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedKey {
    Ctrl,
    CtrlL,
    CtrlR,
    Shift,
    ShiftL,
    ShiftR,
    Alt,
    AltL,
    AltR,
    Super,
    Enter,
    Space,
    Backspace,
    Tab,
    Escape,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Insert,
    CapsLock,
    NumLock,
    ScrollLock,
    PrintScreen,
    Pause,
    F(u8),
}

const NAMED_KEYS: &[(&str, NamedKey)] = &[
    ("CTRL", NamedKey::Ctrl),
    ("CTRL_L", NamedKey::CtrlL),
    ("CTRL_R", NamedKey::CtrlR),
    ("SHIFT", NamedKey::Shift),
    ("SHIFT_L", NamedKey::ShiftL),
    ("SHIFT_R", NamedKey::ShiftR),
    ("ALT", NamedKey::Alt),
    ("ALT_L", NamedKey::AltL),
    ("ALT_R", NamedKey::AltR),
    ("WIN", NamedKey::Super),
    ("SUPER", NamedKey::Super),
    ("ENTER", NamedKey::Enter),
    ("RETURN", NamedKey::Enter),
    ("SPACE", NamedKey::Space),
    ("BACKSPACE", NamedKey::Backspace),
    ("TAB", NamedKey::Tab),
    ("ESC", NamedKey::Escape),
    ("ESCAPE", NamedKey::Escape),
    ("DELETE", NamedKey::Delete),
    ("DEL", NamedKey::Delete),
    ("HOME", NamedKey::Home),
    ("END", NamedKey::End),
    ("PAGEUP", NamedKey::PageUp),
    ("PAGE_UP", NamedKey::PageUp),
    ("PAGEDOWN", NamedKey::PageDown),
    ("PAGE_DOWN", NamedKey::PageDown),
    ("UP", NamedKey::Up),
    ("DOWN", NamedKey::Down),
    ("LEFT", NamedKey::Left),
    ("RIGHT", NamedKey::Right),
    ("INSERT", NamedKey::Insert),
    ("CAPSLOCK", NamedKey::CapsLock),
    ("NUMLOCK", NamedKey::NumLock),
    ("SCROLLLOCK", NamedKey::ScrollLock),
    ("PRINTSCREEN", NamedKey::PrintScreen),
    ("PAUSE", NamedKey::Pause),
];

/// A keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Char(char),
    Named(NamedKey),
}

impl Key {
    /// Looks up a key by name, ignoring case.
    pub fn parse(name: &str) -> Option<Key> {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Some(Key::Char(c));
        }
        let upper = name.to_ascii_uppercase();
        if let Some((_, key)) = NAMED_KEYS.iter().find(|(n, _)| *n == upper) {
            return Some(Key::Named(*key));
        }
        let n: u8 = upper.strip_prefix('F')?.parse().ok()?;
        (1..=12).contains(&n).then_some(Key::Named(NamedKey::F(n)))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::Named(NamedKey::F(n)) => write!(f, "F{}", n),
            Key::Named(named) => {
                let name = NAMED_KEYS
                    .iter()
                    .find(|(_, k)| k == named)
                    .map(|(n, _)| *n)
                    .unwrap_or("?");
                write!(f, "{}", name)
            }
        }
    }
}

/// Parses a `+`-joined key combo such as `ctrl+shift+a` or `ctrl++`.
///
/// Returns the name of the first unknown key on failure.
pub fn parse_combo(combo: &str) -> Result<Vec<Key>, String> {
    if combo.is_empty() {
        return Err(String::new());
    }
    let mut keys = Vec::new();
    let mut parts: Vec<&str> = combo.split('+').collect();
    // A trailing `++` means the plus key itself.
    if combo.len() > 1 && combo.ends_with("++") {
        parts.truncate(parts.len() - 2);
        parts.push("+");
    } else if combo == "+" {
        parts = vec!["+"];
    }
    for part in parts {
        match Key::parse(part) {
            Some(key) => keys.push(key),
            None => return Err(part.to_string()),
        }
    }
    Ok(keys)
}

/// A mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn parse(name: &str) -> Option<MouseButton> {
        match name.to_ascii_uppercase().as_str() {
            "LEFT" => Some(MouseButton::Left),
            "RIGHT" => Some(MouseButton::Right),
            "MIDDLE" => Some(MouseButton::Middle),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MouseButton::Left => "LEFT",
            MouseButton::Right => "RIGHT",
            MouseButton::Middle => "MIDDLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_characters_are_char_keys() {
        assert_eq!(Key::parse("a"), Some(Key::Char('a')));
        assert_eq!(Key::parse("A"), Some(Key::Char('A')));
        assert_eq!(Key::parse("7"), Some(Key::Char('7')));
    }

    #[test]
    fn named_keys_ignore_case_and_aliases_agree() {
        assert_eq!(Key::parse("enter"), Some(Key::Named(NamedKey::Enter)));
        assert_eq!(Key::parse("Return"), Key::parse("ENTER"));
        assert_eq!(Key::parse("esc"), Key::parse("escape"));
        assert_eq!(Key::parse("page_down"), Key::parse("PageDown"));
        assert_eq!(Key::parse("win"), Some(Key::Named(NamedKey::Super)));
    }

    #[test]
    fn function_keys_are_bounded() {
        assert_eq!(Key::parse("f1"), Some(Key::Named(NamedKey::F(1))));
        assert_eq!(Key::parse("F12"), Some(Key::Named(NamedKey::F(12))));
        assert_eq!(Key::parse("F13"), None);
        assert_eq!(Key::parse("F0"), None);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(Key::parse("hyper"), None);
        assert_eq!(Key::parse(""), None);
    }

    #[test]
    fn combos_parse_in_order() {
        let keys = parse_combo("ctrl+shift+a").unwrap();
        assert_eq!(
            keys,
            vec![
                Key::Named(NamedKey::Ctrl),
                Key::Named(NamedKey::Shift),
                Key::Char('a')
            ]
        );
        assert_eq!(parse_combo("ctrl++").unwrap(), vec![Key::Named(NamedKey::Ctrl), Key::Char('+')]);
        assert_eq!(parse_combo("+").unwrap(), vec![Key::Char('+')]);
        assert_eq!(parse_combo("ctrl+bogus"), Err("bogus".to_string()));
    }

    #[test]
    fn key_display_uses_table_name() {
        assert_eq!(Key::Named(NamedKey::PageUp).to_string(), "PAGEUP");
        assert_eq!(Key::Named(NamedKey::F(5)).to_string(), "F5");
        assert_eq!(Key::Char('x').to_string(), "x");
    }

    #[test]
    fn mouse_buttons() {
        assert_eq!(MouseButton::parse("left"), Some(MouseButton::Left));
        assert_eq!(MouseButton::parse("MIDDLE"), Some(MouseButton::Middle));
        assert_eq!(MouseButton::parse("side"), None);
    }
}
