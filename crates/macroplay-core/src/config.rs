//! Persistent configuration for macroplay.
//!
//! Stores user settings in `~/.macroplay/config.json`: where CALL targets and
//! image templates live, playback timing, the loop and call safeguards and the
//! command alias table. Every field is optional in the file; missing fields
//! take their defaults.
//!
//! # Example
//!
//! ```no_run
//! use macroplay_core::config::MacroConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = MacroConfig::load();
//! println!("playback speed: {}", config.playback_speed);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::parser::AliasTable;
use crate::variables::UndefinedPolicy;

const CONFIG_FILENAME: &str = "config.json";

/// Returns the macroplay directory (`~/.macroplay`), creating it if needed.
///
/// Falls back to `.macroplay` in the working directory when there is no home
/// directory.
pub fn macroplay_dir() -> PathBuf {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".macroplay");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Runtime settings for a playback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MacroConfig {
    /// Root for relative CALL paths. Defaults to the calling script's
    /// directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macros_dir: Option<PathBuf>,

    /// Root for relative `IMAGE_MATCH` templates. Defaults to the macro root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,

    /// Multiplier applied to every wait; 2.0 plays twice as fast.
    pub playback_speed: f64,

    /// Hold time between mouse press and release.
    pub mousewait_ms: u64,

    /// Hold time between key press and release.
    pub keywait_ms: u64,

    /// Iterations any single loop may run before the run fails.
    pub max_iterations: u64,

    /// Maximum number of nested CALLs below the entry script.
    pub max_call_depth: usize,

    pub undefined_variables: UndefinedPolicy,

    /// Alias command name to canonical command name.
    pub aliases: BTreeMap<String, String>,

    /// Directory for JSON Lines run logs. No run log when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            macros_dir: None,
            templates_dir: None,
            playback_speed: 1.0,
            mousewait_ms: 50,
            keywait_ms: 30,
            max_iterations: 100_000,
            max_call_depth: 16,
            undefined_variables: UndefinedPolicy::Empty,
            aliases: BTreeMap::new(),
            log_dir: None,
        }
    }
}

impl MacroConfig {
    /// Load config from `~/.macroplay/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&macroplay_dir().join(CONFIG_FILENAME))
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to `~/.macroplay/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        let path = macroplay_dir().join(CONFIG_FILENAME);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// The alias table the tokenizer resolves command names with.
    pub fn alias_table(&self) -> AliasTable {
        AliasTable::from_pairs(&self.aliases)
    }

    /// Directory that relative `IMAGE_MATCH` templates resolve against.
    pub fn template_root(&self, script_dir: &Path) -> PathBuf {
        self.templates_dir
            .clone()
            .or_else(|| self.macros_dir.clone())
            .unwrap_or_else(|| script_dir.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = MacroConfig::default();
        assert_eq!(config.playback_speed, 1.0);
        assert_eq!(config.mousewait_ms, 50);
        assert_eq!(config.keywait_ms, 30);
        assert_eq!(config.max_iterations, 100_000);
        assert_eq!(config.max_call_depth, 16);
        assert_eq!(config.undefined_variables, UndefinedPolicy::Empty);
        assert!(config.macros_dir.is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let loaded: MacroConfig = serde_json::from_str(
            r#"{"playback_speed": 2.5, "undefined_variables": "error", "aliases": {"click": "MOUSE_LEFT_CLICK"}}"#,
        )
        .unwrap();
        assert_eq!(loaded.playback_speed, 2.5);
        assert_eq!(loaded.undefined_variables, UndefinedPolicy::Error);
        assert_eq!(loaded.keywait_ms, 30);
        assert_eq!(loaded.alias_table().resolve("CLICK"), "MOUSE_LEFT_CLICK");
    }

    #[test]
    fn roundtrip_serialization() {
        let config = MacroConfig {
            macros_dir: Some(PathBuf::from("/macros")),
            ..MacroConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("templates_dir"));
        let loaded: MacroConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_from_missing_or_invalid_file_gives_defaults() {
        let missing = std::env::temp_dir().join(format!("macroplay-missing-{}.json", uuid::Uuid::new_v4()));
        assert_eq!(MacroConfig::load_from(&missing), MacroConfig::default());

        let invalid = std::env::temp_dir().join(format!("macroplay-invalid-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&invalid, "{ not json").unwrap();
        assert_eq!(MacroConfig::load_from(&invalid), MacroConfig::default());
        std::fs::remove_file(&invalid).ok();
    }

    #[test]
    fn template_root_prefers_explicit_dirs() {
        let mut config = MacroConfig::default();
        assert_eq!(config.template_root(Path::new("/scripts")), PathBuf::from("/scripts"));
        config.macros_dir = Some(PathBuf::from("/macros"));
        assert_eq!(config.template_root(Path::new("/scripts")), PathBuf::from("/macros"));
        config.templates_dir = Some(PathBuf::from("/templates"));
        assert_eq!(config.template_root(Path::new("/scripts")), PathBuf::from("/templates"));
    }
}
