use std::io;

use futures::stream::BoxStream;
use utils::log_msg::LogMsg;
use uuid::Uuid;

use crate::services::task_logs::TaskLogStore;

/// Hands out live views of task logs.
///
/// Attaching never fails: an id no run has claimed yet is registered as
/// pending, and the view starts delivering once a run adopts it.
#[derive(Debug, Clone)]
pub struct ProgressBroadcaster {
    task_logs: TaskLogStore,
}

impl ProgressBroadcaster {
    pub fn new(task_logs: TaskLogStore) -> Self {
        Self { task_logs }
    }

    pub async fn attach(&self, id: Uuid) -> BoxStream<'static, Result<LogMsg, io::Error>> {
        let store = self.task_logs.register(id).await;
        tracing::debug!(
            "Observer attached to task {} ({} lines so far)",
            id,
            store.len()
        );
        store.history_plus_stream()
    }
}
