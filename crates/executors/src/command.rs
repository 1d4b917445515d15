use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::process::Command;

/// Program plus positional arguments for one external stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuilder {
    program: PathBuf,
    params: Vec<OsString>,
}

impl CommandBuilder {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            params: Vec::new(),
        }
    }

    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn extend_params<I, S>(mut self, more: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.params.extend(more.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.params
    }

    /// Space-joined rendering for log output only.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.params.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn in a new process group with stdout and stderr piped.
    pub fn spawn(&self, current_dir: Option<&Path>) -> std::io::Result<AsyncGroupChild> {
        let mut command = Command::new(&self.program);
        command
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .args(&self.params)
            // python buffers stdout when it is a pipe
            .env("PYTHONUNBUFFERED", "1");

        if let Some(dir) = current_dir {
            command.current_dir(dir);
        }

        command.group_spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_params_in_order() {
        let cmd = CommandBuilder::new("python3")
            .params(["Import_data.py", "EURUSD=X"])
            .extend_params(["2024-01-01"]);

        assert_eq!(cmd.program(), Path::new("python3"));
        assert_eq!(cmd.args().len(), 3);
        assert_eq!(cmd.display(), "python3 Import_data.py EURUSD=X 2024-01-01");
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let cmd = CommandBuilder::new("/definitely/not/a/real/program");
        assert!(cmd.spawn(None).is_err());
    }
}
