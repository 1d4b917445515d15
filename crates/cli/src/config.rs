//! Configuration management for the backtest CLI
//!
//! Handles loading and saving configuration from ~/.backtest/config.toml

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_url")]
    pub url: String,
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Prefix log lines with the stream they came from in `status`.
    #[serde(default)]
    pub show_stream: bool,

    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_stream: false,
            color: true,
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".backtest")
            .join("config.toml")
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Get a configuration value by key path (e.g., "server.url")
    pub fn get(&self, key: &str) -> Option<String> {
        match key.split('.').collect::<Vec<_>>().as_slice() {
            ["server", "url"] => Some(self.server.url.clone()),
            ["display", "show_stream"] => Some(self.display.show_stream.to_string()),
            ["display", "color"] => Some(self.display.color.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key path. Does not save.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key.split('.').collect::<Vec<_>>().as_slice() {
            ["server", "url"] => self.server.url = value.trim_end_matches('/').to_string(),
            ["display", "show_stream"] => self.display.show_stream = parse_bool(key, value)?,
            ["display", "color"] => self.display.color = parse_bool(key, value)?,
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("{} expects true or false, got {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.server.url, "http://127.0.0.1:5000");
        assert!(config.display.color);
    }

    #[test]
    fn test_set_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".backtest").join("config.toml");

        let mut config = Config::default();
        config.set("server.url", "http://10.0.0.5:5000/").unwrap();
        config.set("display.show_stream", "true").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.get("server.url").as_deref(), Some("http://10.0.0.5:5000"));
        assert_eq!(loaded.get("display.show_stream").as_deref(), Some("true"));
    }

    #[test]
    fn test_rejects_unknown_keys_and_bad_values() {
        let mut config = Config::default();
        assert!(config.set("server.token", "x").is_err());
        assert!(config.set("display.color", "maybe").is_err());
        assert_eq!(config.get("nope"), None);
    }
}
