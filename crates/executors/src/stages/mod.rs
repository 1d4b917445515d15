use std::path::Path;

use enum_dispatch::enum_dispatch;
use futures::{StreamExt, TryStreamExt, stream::select};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use workspace_utils::{log_lines::lines, log_msg::LogMsg};

use crate::command::CommandBuilder;

pub mod analyze;
pub mod prepare_data;

pub use analyze::Analyze;
pub use prepare_data::PrepareData;

/// Exit code reported for a process that ended without one (killed by a signal).
pub const NO_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageKind {
    Prepare,
    Analyze,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    SpawnError(#[from] std::io::Error),
    #[error("{0} of the stage process was not captured")]
    MissingPipe(&'static str),
    #[error("Failed to wait for stage process: {0}")]
    Wait(std::io::Error),
}

#[enum_dispatch]
pub trait Executable {
    fn kind(&self) -> StageKind;

    /// Name shown in log lines, usually the script file name.
    fn label(&self) -> String;

    fn command(&self, interpreter: &Path) -> CommandBuilder;
}

#[enum_dispatch(Executable)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageAction {
    PrepareData,
    Analyze,
}

impl StageAction {
    /// Run the stage to completion.
    ///
    /// Every stdout and stderr line is handed to `on_msg` in arrival order.
    /// Both pipes are drained before the exit status is collected, so no line
    /// is delivered after this returns. A non-zero exit code is returned as a
    /// value; only failing to start (or to reap) the process is an error.
    pub async fn run<F>(
        &self,
        interpreter: &Path,
        current_dir: Option<&Path>,
        mut on_msg: F,
    ) -> Result<i32, ExecutorError>
    where
        F: FnMut(LogMsg) + Send,
    {
        let command = self.command(interpreter);
        tracing::debug!("Spawning {} stage: {}", self.kind(), command.display());

        let mut child = command.spawn(current_dir)?;

        let stdout = child
            .inner()
            .stdout
            .take()
            .ok_or(ExecutorError::MissingPipe("stdout"))?;
        let stderr = child
            .inner()
            .stderr
            .take()
            .ok_or(ExecutorError::MissingPipe("stderr"))?;

        let out = lines(stdout).map_ok(LogMsg::Stdout);
        let err = lines(stderr).map_ok(LogMsg::Stderr);
        let mut merged = select(out, err);

        while let Some(item) = merged.next().await {
            match item {
                Ok(msg) => on_msg(msg),
                Err(e) => tracing::warn!("Failed to read {} stage output: {}", self.kind(), e),
            }
        }

        let status = child.wait().await.map_err(ExecutorError::Wait)?;
        let exit_code = status.code().unwrap_or(NO_EXIT_CODE);
        tracing::debug!("{} stage exited with code {}", self.kind(), exit_code);
        Ok(exit_code)
    }
}
