use std::{
    collections::{HashMap, hash_map::Entry},
    io,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;
use tokio::sync::RwLock;
use utils::{log_msg::LogMsg, msg_store::MsgStore};
use uuid::Uuid;

use crate::services::run_spec::RunSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskState {
    /// Registered by an observer before any run claimed the id.
    Pending,
    Importing,
    Analyzing,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Importing => 1,
            TaskState::Analyzing => 2,
            TaskState::Succeeded | TaskState::Failed => 3,
        }
    }

    /// States only move forward and a terminal state is final.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

#[derive(Debug, Error)]
pub enum TaskLogError {
    #[error("Unknown task {0}")]
    UnknownTask(Uuid),
    #[error("Task {0} already has a run")]
    AlreadyClaimed(Uuid),
    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TaskState,
        to: TaskState,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunSpec>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub line_count: usize,
}

/// A summary plus the full tagged log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetails {
    #[serde(flatten)]
    pub summary: TaskSummary,
    pub log: Vec<LogMsg>,
}

#[derive(Debug)]
struct TaskEntry {
    store: Arc<MsgStore>,
    state: TaskState,
    run: Option<RunSpec>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TaskEntry {
    fn new(state: TaskState) -> Self {
        Self {
            store: Arc::new(MsgStore::new()),
            state,
            run: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    fn summary(&self, id: Uuid) -> TaskSummary {
        TaskSummary {
            id,
            state: self.state,
            run: self.run.clone(),
            created_at: self.created_at,
            finished_at: self.finished_at,
            line_count: self.store.line_count(),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        let since = match (self.state, self.finished_at) {
            (state, Some(finished_at)) if state.is_terminal() => finished_at,
            // nobody claimed it and nobody is waiting on it
            (TaskState::Pending, _) if self.store.subscriber_count() == 0 => self.created_at,
            _ => return false,
        };
        (now - since).to_std().is_ok_and(|age| age >= retention)
    }
}

/// Registry of every task's log and state.
///
/// Cheap to clone; all clones share the same registry. Each task has exactly
/// one writer (its pipeline) and any number of observers.
#[derive(Debug, Clone, Default)]
pub struct TaskLogStore {
    tasks: Arc<RwLock<HashMap<Uuid, TaskEntry>>>,
}

impl TaskLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the log of an accepted run. An id an observer registered earlier
    /// is adopted so that observer keeps its place; an id some run already
    /// claimed is rejected, so each task runs its pipeline once.
    pub async fn create(&self, id: Uuid, run: RunSpec) -> Result<Arc<MsgStore>, TaskLogError> {
        let mut tasks = self.tasks.write().await;
        let entry = match tasks.entry(id) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                if entry.state != TaskState::Pending {
                    tracing::warn!("Task {} already has a run ({})", id, entry.state);
                    return Err(TaskLogError::AlreadyClaimed(id));
                }
                tracing::debug!("Task {} adopted a log registered by an observer", id);
                entry
            }
            Entry::Vacant(vacant) => vacant.insert(TaskEntry::new(TaskState::Pending)),
        };
        entry.state = TaskState::Importing;
        entry.created_at = Utc::now();
        entry.run = Some(run);
        tracing::info!("Task {} is {}", id, entry.state);
        Ok(entry.store.clone())
    }

    /// Get the log for `id`, registering an empty `Pending` one if no task
    /// has that id yet.
    pub async fn register(&self, id: Uuid) -> Arc<MsgStore> {
        if let Some(store) = self.store(id).await {
            return store;
        }
        let mut tasks = self.tasks.write().await;
        tasks
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!("Registered pending task {}", id);
                TaskEntry::new(TaskState::Pending)
            })
            .store
            .clone()
    }

    pub async fn store(&self, id: Uuid) -> Option<Arc<MsgStore>> {
        self.tasks.read().await.get(&id).map(|entry| entry.store.clone())
    }

    async fn require_store(&self, id: Uuid) -> Result<Arc<MsgStore>, TaskLogError> {
        self.store(id).await.ok_or(TaskLogError::UnknownTask(id))
    }

    pub async fn append(&self, id: Uuid, msg: LogMsg) -> Result<(), TaskLogError> {
        self.require_store(id).await?.push(msg);
        Ok(())
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<Vec<LogMsg>, TaskLogError> {
        Ok(self.require_store(id).await?.get_history())
    }

    /// Everything recorded so far followed by each new entry, ending after
    /// the task finishes.
    pub async fn subscribe(
        &self,
        id: Uuid,
    ) -> Result<BoxStream<'static, Result<LogMsg, io::Error>>, TaskLogError> {
        Ok(self.require_store(id).await?.history_plus_stream())
    }

    pub async fn state(&self, id: Uuid) -> Result<TaskState, TaskLogError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .map(|entry| entry.state)
            .ok_or(TaskLogError::UnknownTask(id))
    }

    pub async fn transition(&self, id: Uuid, next: TaskState) -> Result<(), TaskLogError> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks.get_mut(&id).ok_or(TaskLogError::UnknownTask(id))?;
        if !entry.state.can_transition_to(next) {
            return Err(TaskLogError::InvalidTransition {
                id,
                from: entry.state,
                to: next,
            });
        }
        tracing::info!("Task {} moved from {} to {}", id, entry.state, next);
        entry.state = next;
        if next.is_terminal() {
            entry.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record the terminal state and close the log.
    pub async fn finish(&self, id: Uuid, terminal: TaskState) -> Result<(), TaskLogError> {
        if !terminal.is_terminal() {
            let from = self.state(id).await?;
            return Err(TaskLogError::InvalidTransition {
                id,
                from,
                to: terminal,
            });
        }
        self.transition(id, terminal).await?;
        self.require_store(id).await?.push_finished();
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<TaskDetails, TaskLogError> {
        let tasks = self.tasks.read().await;
        let entry = tasks.get(&id).ok_or(TaskLogError::UnknownTask(id))?;
        Ok(TaskDetails {
            summary: entry.summary(id),
            log: entry.store.get_history(),
        })
    }

    /// Summaries of every known task, newest first.
    pub async fn list(&self) -> Vec<TaskSummary> {
        let tasks = self.tasks.read().await;
        let mut summaries: Vec<TaskSummary> = tasks
            .iter()
            .map(|(id, entry)| entry.summary(*id))
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    pub async fn evict(&self, id: Uuid) -> bool {
        let removed = self.tasks.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!("Evicted task {}", id);
        }
        removed
    }

    /// Drop finished tasks older than `retention`, and pending ids nobody
    /// claimed or watched for that long. Returns how many were dropped.
    pub async fn evict_expired(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|id, entry| {
            let expired = entry.is_expired(now, retention);
            if expired {
                tracing::debug!("Evicting expired task {} ({})", id, entry.state);
            }
            !expired
        });
        before - tasks.len()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn run() -> RunSpec {
        RunSpec {
            name: "t1".to_string(),
            asset_name: "EURUSD=X".to_string(),
            start_date: "2024-01-01".to_string(),
            end_date: "2024-02-01".to_string(),
            interval: "5m".to_string(),
            script_name: "strategy_a.py".to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_to_unknown_task_is_an_error() {
        let logs = TaskLogStore::new();
        let id = Uuid::new_v4();

        let err = logs
            .append(id, LogMsg::Info("hello".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskLogError::UnknownTask(unknown) if unknown == id));
        assert!(logs.snapshot(id).await.is_err());
        assert!(logs.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_append_snapshot() {
        let logs = TaskLogStore::new();
        let id = Uuid::new_v4();
        logs.create(id, run()).await.unwrap();

        logs.append(id, LogMsg::Info("Importing Data...".to_string()))
            .await
            .unwrap();
        logs.append(id, LogMsg::Stdout("fetched 10 rows".to_string()))
            .await
            .unwrap();

        assert_eq!(logs.state(id).await.unwrap(), TaskState::Importing);
        assert_eq!(
            logs.snapshot(id).await.unwrap(),
            vec![
                LogMsg::Info("Importing Data...".to_string()),
                LogMsg::Stdout("fetched 10 rows".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_adopts_pending_registration() {
        let logs = TaskLogStore::new();
        let id = Uuid::new_v4();

        let observed = logs.register(id).await;
        assert_eq!(logs.state(id).await.unwrap(), TaskState::Pending);

        let created = logs.create(id, run()).await.unwrap();
        assert!(Arc::ptr_eq(&observed, &created));
        assert_eq!(logs.state(id).await.unwrap(), TaskState::Importing);
        assert_eq!(logs.get(id).await.unwrap().summary.run, Some(run()));
    }

    #[tokio::test]
    async fn test_transitions_only_move_forward() {
        let logs = TaskLogStore::new();
        let id = Uuid::new_v4();
        logs.create(id, run()).await.unwrap();

        logs.transition(id, TaskState::Analyzing).await.unwrap();
        assert!(matches!(
            logs.transition(id, TaskState::Importing).await,
            Err(TaskLogError::InvalidTransition { .. })
        ));
        assert!(logs.finish(id, TaskState::Analyzing).await.is_err());

        logs.finish(id, TaskState::Succeeded).await.unwrap();
        assert!(logs.finish(id, TaskState::Failed).await.is_err());

        let details = logs.get(id).await.unwrap();
        assert_eq!(details.summary.state, TaskState::Succeeded);
        assert!(details.summary.finished_at.is_some());
        assert_eq!(details.log, vec![LogMsg::Finished]);
    }

    #[tokio::test]
    async fn test_subscribe_after_finish_replays_and_ends() {
        let logs = TaskLogStore::new();
        let id = Uuid::new_v4();
        logs.create(id, run()).await.unwrap();
        logs.append(id, LogMsg::Info("Run successful!".to_string()))
            .await
            .unwrap();
        logs.transition(id, TaskState::Analyzing).await.unwrap();
        logs.finish(id, TaskState::Succeeded).await.unwrap();

        let seen: Vec<LogMsg> = logs
            .subscribe(id)
            .await
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(
            seen,
            vec![LogMsg::Info("Run successful!".to_string()), LogMsg::Finished]
        );
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let logs = TaskLogStore::new();
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        logs.create(older, run()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        logs.create(newer, run()).await.unwrap();

        let ids: Vec<Uuid> = logs.list().await.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![newer, older]);
    }

    #[tokio::test]
    async fn test_evict_expired_keeps_running_tasks() {
        let logs = TaskLogStore::new();
        let running = Uuid::new_v4();
        let done = Uuid::new_v4();
        let abandoned = Uuid::new_v4();
        logs.create(running, run()).await.unwrap();
        logs.create(done, run()).await.unwrap();
        logs.finish(done, TaskState::Failed).await.unwrap();
        logs.register(abandoned).await;

        assert_eq!(logs.evict_expired(Duration::from_secs(3600)).await, 0);
        assert_eq!(logs.evict_expired(Duration::ZERO).await, 2);

        assert!(logs.state(running).await.is_ok());
        assert!(logs.state(done).await.is_err());
        assert!(logs.state(abandoned).await.is_err());
    }

    #[tokio::test]
    async fn test_watched_pending_task_is_not_evicted() {
        let logs = TaskLogStore::new();
        let id = Uuid::new_v4();
        let _watching = logs.register(id).await.history_plus_stream();

        assert_eq!(logs.evict_expired(Duration::ZERO).await, 0);
        assert!(logs.evict(id).await);
        assert!(!logs.evict(id).await);
    }

    #[tokio::test]
    async fn test_create_rejects_claimed_id() {
        let logs = TaskLogStore::new();
        let id = Uuid::new_v4();
        logs.create(id, run()).await.unwrap();
        logs.append(id, LogMsg::Info("Importing Data...".to_string()))
            .await
            .unwrap();

        let err = logs.create(id, run()).await.unwrap_err();
        assert!(matches!(err, TaskLogError::AlreadyClaimed(claimed) if claimed == id));

        logs.finish(id, TaskState::Succeeded).await.unwrap();
        assert!(logs.create(id, run()).await.is_err());
        assert_eq!(logs.state(id).await.unwrap(), TaskState::Succeeded);
    }

    #[tokio::test]
    async fn test_line_count_skips_end_marker() {
        let logs = TaskLogStore::new();
        let id = Uuid::new_v4();
        logs.create(id, run()).await.unwrap();
        logs.append(id, LogMsg::Stdout("one".to_string())).await.unwrap();
        logs.append(id, LogMsg::Stderr("two".to_string())).await.unwrap();
        logs.finish(id, TaskState::Failed).await.unwrap();

        let summary = logs.get(id).await.unwrap().summary;
        assert_eq!(summary.line_count, 2);
        assert_eq!(logs.list().await[0].line_count, 2);
    }
}
