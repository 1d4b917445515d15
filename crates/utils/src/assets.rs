use std::{env, path::PathBuf};

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");
const ASSET_DIR_ENV: &str = "BACKTEST_ASSET_DIR";

/// Root directory for configuration, scripts and archived runs.
///
/// Resolution order:
/// 1. `BACKTEST_ASSET_DIR` if set
/// 2. `dev_assets/` at the workspace root in debug builds
/// 3. the platform data dir in release builds
///    (`~/.local/share/backtest-runner` on Linux)
///
/// The directory is not created here; the deployment creates it on startup.
pub fn asset_dir() -> PathBuf {
    if let Ok(custom_dir) = env::var(ASSET_DIR_ENV) {
        return PathBuf::from(custom_dir);
    }

    if cfg!(debug_assertions) {
        return PathBuf::from(PROJECT_ROOT).join("../../dev_assets");
    }

    ProjectDirs::from("dev", "backtest", "backtest-runner")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".backtest-runner"))
}

pub fn config_path() -> PathBuf {
    asset_dir().join("config.json")
}

pub fn default_scripts_dir() -> PathBuf {
    asset_dir().join("python-scripts")
}

pub fn default_archive_dir() -> PathBuf {
    asset_dir().join("Archive")
}
