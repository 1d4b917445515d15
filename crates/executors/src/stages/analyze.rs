use std::path::{Path, PathBuf};

use crate::{
    command::CommandBuilder,
    stages::{Executable, StageKind},
};

/// Runs the user's analysis script against a prepared output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analyze {
    pub script_name: String,
    pub script_path: PathBuf,
    pub output_dir: PathBuf,
}

impl Executable for Analyze {
    fn kind(&self) -> StageKind {
        StageKind::Analyze
    }

    fn label(&self) -> String {
        self.script_name.clone()
    }

    fn command(&self, interpreter: &Path) -> CommandBuilder {
        CommandBuilder::new(interpreter)
            .params([self.script_path.as_os_str(), self.output_dir.as_os_str()])
    }
}
