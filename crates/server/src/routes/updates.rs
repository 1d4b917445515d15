use std::{io, time::Duration};

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use deployment::Deployment;
use futures::Stream;
use uuid::Uuid;

use crate::DeploymentImpl;

/// Progress of a task as server-sent events.
///
/// Every line recorded so far is replayed, then new lines follow as they are
/// written. Once the task is done a `finished` event is sent and the stream
/// closes. Attaching before the task exists is allowed.
pub async fn stream_updates(
    Path(task_id): Path<Uuid>,
    State(deployment): State<DeploymentImpl>,
) -> Sse<impl Stream<Item = Result<Event, io::Error>>> {
    let stream = deployment.stream_task_updates(task_id).await;
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/updates/{task_id}", get(stream_updates))
}
