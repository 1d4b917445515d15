use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use crate::{
    command::CommandBuilder,
    stages::{Executable, StageKind},
};

/// Fetches market data for a run into its output directory.
///
/// Invoked as
/// `<interpreter> <prepare script> <asset> <start> <end> <interval> <analysis script> <output dir>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareData {
    pub script_path: PathBuf,
    pub asset_name: String,
    pub start_date: String,
    pub end_date: String,
    pub interval: String,
    pub analysis_script: String,
    pub output_dir: PathBuf,
}

impl Executable for PrepareData {
    fn kind(&self) -> StageKind {
        StageKind::Prepare
    }

    fn label(&self) -> String {
        self.script_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.script_path.display().to_string())
    }

    fn command(&self, interpreter: &Path) -> CommandBuilder {
        CommandBuilder::new(interpreter).params([
            self.script_path.as_os_str(),
            OsStr::new(&self.asset_name),
            OsStr::new(&self.start_date),
            OsStr::new(&self.end_date),
            OsStr::new(&self.interval),
            OsStr::new(&self.analysis_script),
            self.output_dir.as_os_str(),
        ])
    }
}
