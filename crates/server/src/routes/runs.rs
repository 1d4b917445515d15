use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::Json as ResponseJson,
    routing::post,
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::run_spec::RunSpec;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAccepted {
    #[serde(rename = "taskId")]
    pub task_id: Uuid,
}

/// Accept a run and return its task id right away; progress is streamed
/// from `/api/updates/{task_id}`.
pub async fn submit_run(
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<RunSpec>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<RunAccepted>>, ApiError> {
    let Json(spec) = payload?;
    spec.validate()?;

    tracing::debug!(
        "Submitting run '{}' ({} on {})",
        spec.name,
        spec.script_name,
        spec.asset_name
    );
    let task_id = deployment.pipeline().submit(spec).await?;
    Ok(ResponseJson(ApiResponse::success(RunAccepted { task_id })))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/run", post(submit_run))
}
