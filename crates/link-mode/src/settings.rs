//! Settings for link-mode
//!
//! This module provides link-mode configuration using a JSON config file.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::composed::DEFAULT_COMPOSED_CAPACITY;
use crate::error::Result;
use crate::hint_labels::DEFAULT_LABEL_LETTERS;
use crate::keys::KeyBinding;
use crate::launcher::default_launch_template;
use crate::patterns::{UrlPatterns, URL_REGEX};

/// When OSC-8 hyperlinks are underlined
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Osc8Underline {
    /// Only while link-mode is active (default)
    #[default]
    UrlMode,
    /// Always; link-mode leaves their cells alone
    Always,
}

/// Link-mode settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkModeSettings {
    /// Letters hint labels are made of
    #[serde(default = "default_label_letters")]
    pub label_letters: String,

    /// Launcher argv; `${url}` is replaced with the activated URL
    #[serde(default = "default_launch_template")]
    pub launch: Vec<String>,

    /// Auto-detection regex
    #[serde(default = "default_url_regex")]
    pub url_regex: String,

    /// Strip trailing punctuation from detected URLs
    #[serde(default = "default_true")]
    pub trim_url_punctuation: bool,

    /// OSC-8 underline policy
    #[serde(default)]
    pub osc8_underline: Osc8Underline,

    /// Keys that leave link-mode
    #[serde(default = "default_cancel_bindings")]
    pub cancel_bindings: Vec<String>,

    /// Key that toggles showing the URI next to each label
    #[serde(default = "default_toggle_uri_binding")]
    pub toggle_uri_binding: String,

    /// Maximum number of composed characters
    #[serde(default = "default_composed_capacity")]
    pub composed_capacity: usize,

    /// TERM sent with launch requests
    #[serde(default = "default_term")]
    pub term: String,

    /// Launch server socket; the runtime directory is used when unset
    #[serde(default)]
    pub server_socket: Option<PathBuf>,
}

fn default_label_letters() -> String {
    DEFAULT_LABEL_LETTERS.to_string()
}

fn default_url_regex() -> String {
    URL_REGEX.to_string()
}

fn default_true() -> bool {
    true
}

fn default_cancel_bindings() -> Vec<String> {
    ["Escape", "Control+c", "Control+g", "Control+d"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_toggle_uri_binding() -> String {
    "t".to_string()
}

fn default_composed_capacity() -> usize {
    DEFAULT_COMPOSED_CAPACITY
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

impl Default for LinkModeSettings {
    fn default() -> Self {
        Self {
            label_letters: default_label_letters(),
            launch: default_launch_template(),
            url_regex: default_url_regex(),
            trim_url_punctuation: true,
            osc8_underline: Osc8Underline::default(),
            cancel_bindings: default_cancel_bindings(),
            toggle_uri_binding: default_toggle_uri_binding(),
            composed_capacity: default_composed_capacity(),
            term: default_term(),
            server_socket: None,
        }
    }
}

impl LinkModeSettings {
    fn sanitize(mut self) -> Self {
        let letters: String = self
            .label_letters
            .chars()
            .filter(|c| !c.is_whitespace())
            .unique_by(|c| c.to_lowercase().collect::<String>())
            .collect();
        if letters.chars().count() < 2 {
            warn!(
                "label_letters {:?} needs at least two distinct letters, using defaults",
                self.label_letters
            );
            self.label_letters = default_label_letters();
        } else {
            self.label_letters = letters;
        }

        if self.launch.first().is_none_or(|program| program.trim().is_empty()) {
            warn!("launch template is empty, using defaults");
            self.launch = default_launch_template();
        }

        if let Err(err) = regex::Regex::new(&self.url_regex) {
            warn!("invalid url_regex, using defaults: {err}");
            self.url_regex = default_url_regex();
        }

        self.cancel_bindings.retain(|binding| match KeyBinding::parse(binding) {
            Ok(_) => true,
            Err(err) => {
                warn!("ignoring cancel binding: {err}");
                false
            }
        });
        if self.cancel_bindings.is_empty() {
            self.cancel_bindings = default_cancel_bindings();
        }

        if let Err(err) = KeyBinding::parse(&self.toggle_uri_binding) {
            warn!("{err}, using defaults");
            self.toggle_uri_binding = default_toggle_uri_binding();
        }

        if self.composed_capacity == 0 {
            self.composed_capacity = default_composed_capacity();
        }

        if self.term.trim().is_empty() {
            self.term = default_term();
        }

        self
    }

    pub fn label_alphabet(&self) -> Vec<char> {
        self.label_letters.chars().collect()
    }

    pub fn url_patterns(&self) -> Result<UrlPatterns> {
        UrlPatterns::new(&self.url_regex, self.trim_url_punctuation)
    }

    pub fn cancel_key_bindings(&self) -> Vec<KeyBinding> {
        self.cancel_bindings
            .iter()
            .filter_map(|binding| KeyBinding::parse(binding).ok())
            .collect()
    }

    pub fn toggle_key_binding(&self) -> Option<KeyBinding> {
        KeyBinding::parse(&self.toggle_uri_binding).ok()
    }

    /// Load settings from a JSON file
    pub fn load(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                    Ok(settings) => return settings.sanitize(),
                    Err(err) => warn!("Failed to parse config file: {err}"),
                },
                Err(e) => {
                    warn!("Failed to read config file: {}", e);
                }
            }
        }

        // Return defaults if file doesn't exist or parsing fails
        Self::default()
    }

    /// Load settings from a JSON file and create a default file when missing.
    pub fn load_or_create(config_path: &Path) -> Self {
        let settings = Self::load(config_path);
        if !config_path.exists() {
            if let Err(err) = settings.save(config_path) {
                warn!(
                    "failed to initialize settings file at {}: {err}",
                    config_path.display()
                );
            }
        }
        settings
    }

    /// Save settings to a JSON file.
    pub fn save(&self, config_path: &Path) -> std::io::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let serialized = serde_json::to_string_pretty(self)
            .map_err(|err| std::io::Error::other(format!("failed to serialize settings: {err}")))?;
        std::fs::write(config_path, serialized)
    }

    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".link-mode"))
            .unwrap_or_else(|| PathBuf::from("./.link-mode"))
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("settings.json")
    }
}
