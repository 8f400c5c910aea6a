//! Configuration loading: parses `readline.toml` (or an override path) for
//! the tunables a real deployment needs, even though the host shell's own
//! configuration file format is out of scope here. Follows the same
//! `discover()` / `load_from()` / fall-back-to-default-on-parse-error shape
//! the teacher used for its own config file.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct UndoConfig {
    #[serde(default = "UndoConfig::default_capacity")]
    pub capacity: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
        }
    }
}

impl UndoConfig {
    const fn default_capacity() -> usize {
        1000
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    #[serde(default = "RenderConfig::default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "RenderConfig::default_dirty_merge_threshold")]
    pub dirty_merge_threshold: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: Self::default_cache_capacity(),
            dirty_merge_threshold: Self::default_dirty_merge_threshold(),
        }
    }
}

impl RenderConfig {
    const fn default_cache_capacity() -> usize {
        64
    }
    const fn default_dirty_merge_threshold() -> usize {
        64
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct InputConfig {
    #[serde(default = "InputConfig::default_byte_timeout_ms")]
    pub byte_timeout_ms: u64,
    #[serde(default = "InputConfig::default_escape_timeout_ms")]
    pub escape_timeout_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            byte_timeout_ms: Self::default_byte_timeout_ms(),
            escape_timeout_ms: Self::default_escape_timeout_ms(),
        }
    }
}

impl InputConfig {
    const fn default_byte_timeout_ms() -> u64 {
        100
    }
    const fn default_escape_timeout_ms() -> u64 {
        50
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TerminalConfig {
    #[serde(default = "TerminalConfig::default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: Self::default_read_timeout_ms(),
        }
    }
}

impl TerminalConfig {
    const fn default_read_timeout_ms() -> u64 {
        100
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConfigFile {
    #[serde(default)]
    pub undo: UndoConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub file: ConfigFile,
}

/// Best-effort config path following platform conventions (XDG / AppData
/// Roaming), preferring a working-directory file first.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("readline.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("readline").join("readline.toml");
    }
    PathBuf::from("readline.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "config_loaded");
                Ok(Config { file })
            }
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
                Ok(Config::default())
            }
        },
        Err(_) => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.file.undo.capacity, 1000);
        assert_eq!(cfg.file.render.cache_capacity, 64);
        assert_eq!(cfg.file.input.byte_timeout_ms, 100);
        assert_eq!(cfg.file.terminal.read_timeout_ms, 100);
    }

    #[test]
    fn parses_partial_overrides() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[undo]\ncapacity = 50\n[render]\ncache_capacity = 16\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.undo.capacity, 50);
        assert_eq!(cfg.file.render.cache_capacity, 16);
        // Unspecified sections keep their defaults.
        assert_eq!(cfg.file.input.byte_timeout_ms, 100);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not valid toml [[[").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn parses_input_and_terminal_timeouts() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[input]\nbyte_timeout_ms = 250\nescape_timeout_ms = 30\n[terminal]\nread_timeout_ms = 75\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.input.byte_timeout_ms, 250);
        assert_eq!(cfg.file.input.escape_timeout_ms, 30);
        assert_eq!(cfg.file.terminal.read_timeout_ms, 75);
    }
}
