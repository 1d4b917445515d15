use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utils::assets::{default_archive_dir, default_scripts_dir};

pub const CONFIG_VERSION: &str = "v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: String,
    /// Program used to run both stage scripts.
    #[serde(default = "default_interpreter")]
    pub interpreter: PathBuf,
    /// Directory holding the data import script and the analysis scripts.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    #[serde(default = "default_prepare_script")]
    pub prepare_script: String,
    /// Root under which every run gets its own output directory.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// How long a finished task's log stays available to observers.
    #[serde(default = "default_log_retention_secs")]
    pub log_retention_secs: u64,
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

fn default_config_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_interpreter() -> PathBuf {
    PathBuf::from("python3")
}

fn default_prepare_script() -> String {
    "Import_data.py".to_string()
}

fn default_log_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_eviction_interval_secs() -> u64 {
    5 * 60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            interpreter: default_interpreter(),
            scripts_dir: default_scripts_dir(),
            prepare_script: default_prepare_script(),
            archive_dir: default_archive_dir(),
            log_retention_secs: default_log_retention_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

impl Config {
    pub fn prepare_script_path(&self) -> PathBuf {
        self.scripts_dir.join(&self.prepare_script)
    }

    pub fn analysis_script_path(&self, script_name: &str) -> PathBuf {
        self.scripts_dir.join(script_name)
    }

    pub fn log_retention(&self) -> Duration {
        Duration::from_secs(self.log_retention_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        // a zero period would make tokio's interval panic
        Duration::from_secs(self.eviction_interval_secs.max(1))
    }
}

/// Will always return a config, falling back to defaults when the file is
/// missing or cannot be parsed.
pub async fn load_config_from_file(config_path: &Path) -> Config {
    match tokio::fs::read_to_string(config_path).await {
        Ok(raw_config) => match serde_json::from_str::<Config>(&raw_config) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Failed to parse config at {}: {}. Using defaults",
                    config_path.display(),
                    e
                );
                Config::default()
            }
        },
        Err(_) => {
            tracing::info!("No config file found at {}, using defaults", config_path.display());
            Config::default()
        }
    }
}

pub async fn save_config_to_file(config: &Config, config_path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let raw_config = serde_json::to_string_pretty(config)?;
    tokio::fs::write(config_path, raw_config).await?;
    Ok(())
}
