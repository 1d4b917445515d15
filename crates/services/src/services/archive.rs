use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::services::run_spec::RunSpec;

pub const METADATA_FILE: &str = "metadata.json";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Output directory {} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Where one run keeps its imported data, results and metadata.
///
/// Named `{script}_{asset}_{start}_to_{end}_{interval}_{timestamp}` under
/// the archive root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirectory {
    path: PathBuf,
}

// keep every run field inside a single path component
fn path_component(value: &str) -> String {
    value.trim().replace(['/', '\\'], "-")
}

impl OutputDirectory {
    pub fn folder_name(spec: &RunSpec, created_at: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}_to_{}_{}_{}",
            path_component(&spec.script_stem()),
            path_component(&spec.asset_name),
            path_component(&spec.start_date),
            path_component(&spec.end_date),
            path_component(&spec.interval),
            created_at.format(TIMESTAMP_FORMAT)
        )
    }

    pub fn for_run(archive_root: &Path, spec: &RunSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            path: archive_root.join(Self::folder_name(spec, created_at)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory. Never reuses one that is already there.
    pub async fn create(&self) -> Result<(), ArchiveError> {
        if let Some(root) = self.path.parent() {
            tokio::fs::create_dir_all(root).await?;
        }
        match tokio::fs::create_dir(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(ArchiveError::AlreadyExists(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the directory and everything in it. Returns whether there was
    /// anything to delete.
    pub async fn remove(&self) -> Result<bool, ArchiveError> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_metadata(&self, spec: &RunSpec) -> Result<PathBuf, ArchiveError> {
        let path = self.path.join(METADATA_FILE);
        tokio::fs::write(&path, serde_json::to_string_pretty(spec)?).await?;
        Ok(path)
    }

    pub async fn read_metadata(&self) -> Result<RunSpec, ArchiveError> {
        let raw = tokio::fs::read_to_string(self.path.join(METADATA_FILE)).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Copy the analysis script next to its results.
    pub async fn archive_script(
        &self,
        script_path: &Path,
        file_name: &str,
    ) -> Result<PathBuf, ArchiveError> {
        let target = self.path.join(file_name);
        tokio::fs::copy(script_path, &target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn spec() -> RunSpec {
        RunSpec {
            name: "t1".to_string(),
            asset_name: "EURUSD=X".to_string(),
            start_date: "2024-01-01".to_string(),
            end_date: "2024-02-01".to_string(),
            interval: "5m".to_string(),
            script_name: "strategy_a.py".to_string(),
        }
    }

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_folder_name() {
        assert_eq!(
            OutputDirectory::folder_name(&spec(), created_at()),
            "strategy_a_EURUSD=X_2024-01-01_to_2024-02-01_5m_2024-03-05_14-07-09"
        );

        let mut nested = spec();
        nested.asset_name = "FX/EURUSD".to_string();
        assert!(
            OutputDirectory::folder_name(&nested, created_at()).starts_with("strategy_a_FX-EURUSD_")
        );
    }

    #[tokio::test]
    async fn test_create_fails_closed_on_collision() {
        let root = TempDir::new().unwrap();
        let dir = OutputDirectory::for_run(&root.path().join("Archive"), &spec(), created_at());

        dir.create().await.unwrap();
        std::fs::write(dir.path().join("data.csv"), "date,close\n").unwrap();

        let err = dir.create().await.unwrap_err();
        assert!(matches!(err, ArchiveError::AlreadyExists(_)));
        assert!(dir.path().join("data.csv").exists());
    }

    #[tokio::test]
    async fn test_remove() {
        let root = TempDir::new().unwrap();
        let dir = OutputDirectory::for_run(root.path(), &spec(), created_at());

        assert!(!dir.remove().await.unwrap());
        dir.create().await.unwrap();
        std::fs::write(dir.path().join("results.csv"), "sharpe\n1.2\n").unwrap();
        assert!(dir.remove().await.unwrap());
        assert!(!dir.path().exists());
    }

    #[tokio::test]
    async fn test_metadata_and_script_copy() {
        let root = TempDir::new().unwrap();
        let script = root.path().join("strategy_a.py");
        std::fs::write(&script, "print('hi')\n").unwrap();

        let dir = OutputDirectory::for_run(&root.path().join("Archive"), &spec(), created_at());
        dir.create().await.unwrap();

        let metadata = dir.write_metadata(&spec()).await.unwrap();
        let raw = std::fs::read_to_string(metadata).unwrap();
        assert!(raw.contains("\"assetName\": \"EURUSD=X\""));
        assert_eq!(dir.read_metadata().await.unwrap(), spec());

        let copy = dir.archive_script(&script, "strategy_a.py").await.unwrap();
        assert_eq!(std::fs::read_to_string(copy).unwrap(), "print('hi')\n");
    }

    #[tokio::test]
    async fn test_missing_script_is_an_error() {
        let root = TempDir::new().unwrap();
        let dir = OutputDirectory::for_run(root.path(), &spec(), created_at());
        dir.create().await.unwrap();

        let err = dir
            .archive_script(&root.path().join("gone.py"), "gone.py")
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Io(_)));
    }
}
