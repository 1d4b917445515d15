use std::{io, sync::Arc};

use anyhow::Error as AnyhowError;
use async_trait::async_trait;
use axum::response::sse::Event;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use services::services::{
    config::{Config, ConfigError},
    pipeline::PipelineService,
    progress::ProgressBroadcaster,
    task_logs::TaskLogStore,
};
use thiserror::Error;
use tokio::{sync::RwLock, task::JoinHandle};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn config(&self) -> &Arc<RwLock<Config>>;

    fn task_logs(&self) -> &TaskLogStore;

    fn pipeline(&self) -> &PipelineService;

    fn progress(&self) -> &ProgressBroadcaster;

    /// Progress of one task as SSE events: every line so far, each new line,
    /// then a `finished` event once the task is done.
    async fn stream_task_updates(&self, id: Uuid) -> BoxStream<'static, Result<Event, io::Error>> {
        self.progress()
            .attach(id)
            .await
            .map_ok(|m| m.to_sse_event())
            .boxed()
    }

    /// Periodically drop task logs past their retention period.
    async fn spawn_log_eviction(&self) -> JoinHandle<()> {
        let task_logs = self.task_logs().clone();
        let config = self.config().clone();
        let period = config.read().await.eviction_interval();
        let mut eviction_interval = tokio::time::interval(period);

        tokio::spawn(async move {
            loop {
                eviction_interval.tick().await;
                let retention = config.read().await.log_retention();
                let evicted = task_logs.evict_expired(retention).await;
                if evicted > 0 {
                    tracing::info!("Evicted {} expired task logs", evicted);
                }
            }
        })
    }
}
