//! Keystrokes and key bindings for link-mode input
//!
//! Keystrokes follow the usual toolkit shape: a lowercase key name, the
//! held modifiers and the character the key produced, if any.

use std::fmt;
use std::str::FromStr;

use crate::error::{LinkModeError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub control: bool,
    pub alt: bool,
    pub shift: bool,
    /// Super / Command.
    pub platform: bool,
}

impl Modifiers {
    pub fn control() -> Self {
        Modifiers {
            control: true,
            ..Default::default()
        }
    }

    /// Any modifier that turns a key into a command rather than text.
    pub fn is_command(&self) -> bool {
        self.control || self.alt || self.platform
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keystroke {
    /// Lowercase key name: `"a"`, `"escape"`, `"backspace"`, ...
    pub key: String,
    pub modifiers: Modifiers,
    pub key_char: Option<char>,
}

impl Keystroke {
    pub fn new(key: impl Into<String>, modifiers: Modifiers) -> Self {
        let key = normalize_key_name(&key.into());
        let key_char = single_char(&key)
            .filter(|_| !modifiers.is_command())
            .map(|c| {
                if modifiers.shift {
                    c.to_ascii_uppercase()
                } else {
                    c
                }
            });

        Keystroke {
            key,
            modifiers,
            key_char,
        }
    }

    /// A plain character key, as typed.
    pub fn from_char(c: char) -> Self {
        Keystroke {
            key: c.to_lowercase().collect(),
            modifiers: Modifiers {
                shift: c.is_uppercase(),
                ..Default::default()
            },
            key_char: Some(c),
        }
    }

    pub fn named(key: &str) -> Self {
        Self::new(key, Modifiers::default())
    }

    pub fn is_backspace(&self) -> bool {
        self.key == "backspace" && !self.modifiers.is_command()
    }

    /// The character this key contributes to a typed label.
    pub fn typed_char(&self) -> Option<char> {
        if self.modifiers.is_command() {
            return None;
        }
        self.key_char
    }
}

/// A configured binding such as `Control+g` or `Escape`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBinding {
    key: String,
    modifiers: Modifiers,
}

impl KeyBinding {
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = || LinkModeError::InvalidKeyBinding(source.to_string());

        let mut parts: Vec<&str> = source.split('+').map(str::trim).collect();
        let key = parts.pop().filter(|k| !k.is_empty()).ok_or_else(invalid)?;

        let mut modifiers = Modifiers::default();
        for part in parts {
            match part.to_ascii_lowercase().as_str() {
                "control" | "ctrl" => modifiers.control = true,
                "alt" | "mod1" => modifiers.alt = true,
                "shift" => modifiers.shift = true,
                "super" | "mod4" | "cmd" | "logo" => modifiers.platform = true,
                _ => return Err(invalid()),
            }
        }

        let key = normalize_key_name(key);
        if single_char(&key).is_none() && !is_named_key(&key) {
            return Err(invalid());
        }

        Ok(KeyBinding { key, modifiers })
    }

    /// Shift only has to match when the binding asks for it, since it is
    /// usually consumed by the keyboard layout.
    pub fn matches(&self, keystroke: &Keystroke) -> bool {
        let held = keystroke.modifiers;
        self.key == keystroke.key
            && self.modifiers.control == held.control
            && self.modifiers.alt == held.alt
            && self.modifiers.platform == held.platform
            && (!self.modifiers.shift || held.shift)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }
}

impl FromStr for KeyBinding {
    type Err = LinkModeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Modifiers {
            control,
            alt,
            shift,
            platform,
        } = self.modifiers;
        for (held, name) in [
            (control, "Control"),
            (alt, "Alt"),
            (shift, "Shift"),
            (platform, "Super"),
        ] {
            if held {
                write!(f, "{name}+")?;
            }
        }
        f.write_str(&self.key)
    }
}

const NAMED_KEYS: &[&str] = &[
    "escape",
    "backspace",
    "enter",
    "tab",
    "space",
    "delete",
    "insert",
    "home",
    "end",
    "pageup",
    "pagedown",
    "up",
    "down",
    "left",
    "right",
];

fn is_named_key(key: &str) -> bool {
    NAMED_KEYS.contains(&key)
        || key
            .strip_prefix('f')
            .and_then(|n| n.parse::<u8>().ok())
            .is_some_and(|n| (1..=24).contains(&n))
}

fn normalize_key_name(key: &str) -> String {
    let lower = key.to_lowercase();
    match lower.as_str() {
        "esc" => "escape".to_string(),
        "return" | "kp_enter" => "enter".to_string(),
        "back" => "backspace".to_string(),
        "page_up" | "prior" => "pageup".to_string(),
        "page_down" | "next" => "pagedown".to_string(),
        _ => lower,
    }
}

fn single_char(key: &str) -> Option<char> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
