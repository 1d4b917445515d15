use std::sync::Arc;

use async_trait::async_trait;
use deployment::{Deployment, DeploymentError};
use services::services::{
    config::{Config, load_config_from_file, save_config_to_file},
    pipeline::PipelineService,
    progress::ProgressBroadcaster,
    task_logs::TaskLogStore,
};
use tokio::sync::RwLock;
use utils::assets::{asset_dir, config_path};

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<RwLock<Config>>,
    task_logs: TaskLogStore,
    pipeline: PipelineService,
    progress: ProgressBroadcaster,
}

impl LocalDeployment {
    /// Wire the services around an already loaded config.
    pub fn from_config(config: Config) -> Self {
        let config = Arc::new(RwLock::new(config));
        let task_logs = TaskLogStore::new();
        let pipeline = PipelineService::new(config.clone(), task_logs.clone());
        let progress = ProgressBroadcaster::new(task_logs.clone());

        Self {
            config,
            task_logs,
            pipeline,
            progress,
        }
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        tokio::fs::create_dir_all(asset_dir()).await?;
        let raw_config = load_config_from_file(&config_path()).await;

        // Always save config so a fresh install gets an editable file
        save_config_to_file(&raw_config, &config_path()).await?;

        if !raw_config.scripts_dir.is_dir() {
            tracing::warn!(
                "Scripts directory {} does not exist, runs will fail to launch",
                raw_config.scripts_dir.display()
            );
        }
        tokio::fs::create_dir_all(&raw_config.archive_dir).await?;

        tracing::info!(
            "Using interpreter {}, scripts from {}, archiving to {}",
            raw_config.interpreter.display(),
            raw_config.scripts_dir.display(),
            raw_config.archive_dir.display()
        );

        let deployment = Self::from_config(raw_config);
        deployment.spawn_log_eviction().await;
        Ok(deployment)
    }

    fn config(&self) -> &Arc<RwLock<Config>> {
        &self.config
    }

    fn task_logs(&self) -> &TaskLogStore {
        &self.task_logs
    }

    fn pipeline(&self) -> &PipelineService {
        &self.pipeline
    }

    fn progress(&self) -> &ProgressBroadcaster {
        &self.progress
    }
}
