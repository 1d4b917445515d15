use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use executors::stages::{Analyze, Executable, ExecutorError, PrepareData, StageAction, StageKind};
use thiserror::Error;
use tokio::sync::RwLock;
use utils::msg_store::MsgStore;
use uuid::Uuid;

use crate::services::{
    archive::{ArchiveError, OutputDirectory},
    config::Config,
    run_spec::RunSpec,
    task_logs::{TaskLogError, TaskLogStore, TaskState},
};

pub const IMPORTING_LINE: &str = "Importing Data...";
pub const SUCCESS_LINE: &str = "Run successful!";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to launch {stage} stage ({label}): {source}")]
    Launch {
        stage: StageKind,
        label: String,
        #[source]
        source: ExecutorError,
    },
    #[error("Error running {label} ({stage} stage) with exit code {exit_code}")]
    StageFailed {
        stage: StageKind,
        label: String,
        exit_code: i32,
    },
    #[error("Could not create output directory: {0}")]
    OutputDirectory(#[source] ArchiveError),
    #[error("Run finished but its results could not be archived: {0}")]
    Persistence(#[source] ArchiveError),
}

impl PipelineError {
    // The directory belongs to someone else (or was never made) when we
    // failed to create it.
    fn owns_output_dir(&self) -> bool {
        !matches!(self, PipelineError::OutputDirectory(_))
    }
}

/// Everything a run needs, resolved from the config once at submission.
#[derive(Debug, Clone)]
struct RunPlan {
    interpreter: PathBuf,
    prepare_script: PathBuf,
    analysis_script: PathBuf,
    output_dir: OutputDirectory,
}

impl RunPlan {
    fn new(config: &Config, spec: &RunSpec) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            prepare_script: config.prepare_script_path(),
            analysis_script: config.analysis_script_path(&spec.script_name),
            output_dir: OutputDirectory::for_run(&config.archive_dir, spec, Utc::now()),
        }
    }

    fn prepare_stage(&self, spec: &RunSpec) -> StageAction {
        StageAction::PrepareData(PrepareData {
            script_path: self.prepare_script.clone(),
            asset_name: spec.asset_name.clone(),
            start_date: spec.start_date.clone(),
            end_date: spec.end_date.clone(),
            interval: spec.interval.clone(),
            analysis_script: spec.script_name.clone(),
            output_dir: self.output_dir.path().to_path_buf(),
        })
    }

    fn analyze_stage(&self, spec: &RunSpec) -> StageAction {
        StageAction::Analyze(Analyze {
            script_name: spec.script_name.clone(),
            script_path: self.analysis_script.clone(),
            output_dir: self.output_dir.path().to_path_buf(),
        })
    }
}

/// Drives runs from submission to a terminal state.
///
/// A run is prepare (data import) then analyze (the user's script), both
/// external processes writing into the run's output directory. The directory
/// survives only if both stages exit 0 and the results were archived.
#[derive(Debug, Clone)]
pub struct PipelineService {
    config: Arc<RwLock<Config>>,
    task_logs: TaskLogStore,
}

impl PipelineService {
    pub fn new(config: Arc<RwLock<Config>>, task_logs: TaskLogStore) -> Self {
        Self { config, task_logs }
    }

    pub fn task_logs(&self) -> &TaskLogStore {
        &self.task_logs
    }

    /// Accept a run and start it in the background. The task is registered
    /// before this returns, so observers can attach to the id right away.
    pub async fn submit(&self, spec: RunSpec) -> Result<Uuid, TaskLogError> {
        let id = Uuid::new_v4();
        let store = self.task_logs.create(id, spec.clone()).await?;
        let plan = RunPlan::new(&*self.config.read().await, &spec);

        let service = self.clone();
        tokio::spawn(async move {
            service.drive(id, spec, plan, store).await;
        });
        Ok(id)
    }

    /// Run a task in the caller's task and wait for its terminal state. Fails
    /// without running anything if `id` already has a run.
    pub async fn run(&self, id: Uuid, spec: RunSpec) -> Result<TaskState, TaskLogError> {
        let store = self.task_logs.create(id, spec.clone()).await?;
        let plan = RunPlan::new(&*self.config.read().await, &spec);
        Ok(self.drive(id, spec, plan, store).await)
    }

    async fn drive(&self, id: Uuid, spec: RunSpec, plan: RunPlan, store: Arc<MsgStore>) -> TaskState {
        tracing::info!(
            "Task {} started: {} on {} ({} to {}, {})",
            id,
            spec.script_name,
            spec.asset_name,
            spec.start_date,
            spec.end_date,
            spec.interval
        );

        let terminal = match self.execute(id, &spec, &plan, &store).await {
            Ok(()) => {
                store.push_info(SUCCESS_LINE);
                tracing::info!(
                    "Task {} succeeded, results in {}",
                    id,
                    plan.output_dir.path().display()
                );
                TaskState::Succeeded
            }
            Err(err) => {
                tracing::warn!("Task {} failed: {}", id, err);
                if err.owns_output_dir() {
                    match plan.output_dir.remove().await {
                        Ok(true) => tracing::info!(
                            "Deleted output directory {}",
                            plan.output_dir.path().display()
                        ),
                        Ok(false) => {}
                        Err(e) => tracing::error!(
                            "Failed to delete output directory {}: {}",
                            plan.output_dir.path().display(),
                            e
                        ),
                    }
                }
                store.push_info(format!("error: {err}"));
                TaskState::Failed
            }
        };

        if let Err(e) = self.task_logs.finish(id, terminal).await {
            // the log was evicted or already closed, the outcome still stands
            tracing::debug!("Could not record {} for task {}: {}", terminal, id, e);
            store.push_finished();
        }
        terminal
    }

    async fn execute(
        &self,
        id: Uuid,
        spec: &RunSpec,
        plan: &RunPlan,
        store: &Arc<MsgStore>,
    ) -> Result<(), PipelineError> {
        store.push_info(IMPORTING_LINE);
        plan.output_dir
            .create()
            .await
            .map_err(PipelineError::OutputDirectory)?;

        self.run_stage(id, &plan.prepare_stage(spec), plan, store)
            .await?;

        store.push_info(format!(
            "Imported data successfully, now running {}...",
            spec.script_name
        ));
        if let Err(e) = self.task_logs.transition(id, TaskState::Analyzing).await {
            tracing::debug!("Task {}: {}", id, e);
        }

        self.run_stage(id, &plan.analyze_stage(spec), plan, store)
            .await?;

        plan.output_dir
            .write_metadata(spec)
            .await
            .map_err(PipelineError::Persistence)?;
        plan.output_dir
            .archive_script(&plan.analysis_script, &spec.script_file_name())
            .await
            .map_err(PipelineError::Persistence)?;
        Ok(())
    }

    async fn run_stage(
        &self,
        id: Uuid,
        stage: &StageAction,
        plan: &RunPlan,
        store: &Arc<MsgStore>,
    ) -> Result<(), PipelineError> {
        tracing::info!("Task {} launching {} stage ({})", id, stage.kind(), stage.label());

        let exit_code = stage
            .run(&plan.interpreter, None, |msg| store.push(msg))
            .await
            .map_err(|source| PipelineError::Launch {
                stage: stage.kind(),
                label: stage.label(),
                source,
            })?;

        tracing::info!(
            "Task {} {} stage exited with code {}",
            id,
            stage.kind(),
            exit_code
        );
        if exit_code != 0 {
            return Err(PipelineError::StageFailed {
                stage: stage.kind(),
                label: stage.label(),
                exit_code,
            });
        }
        Ok(())
    }
}
