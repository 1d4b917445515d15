use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use deployment::Deployment;
use services::services::task_logs::{TaskDetails, TaskSummary};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

pub async fn get_tasks(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<TaskSummary>>>, ApiError> {
    let tasks = deployment.task_logs().list().await;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn get_task(
    Path(task_id): Path<Uuid>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<TaskDetails>>, ApiError> {
    let task = deployment.task_logs().get(task_id).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let inner = Router::new()
        .route("/", get(get_tasks))
        .route("/{task_id}", get(get_task));

    Router::new().nest("/tasks", inner)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use services::services::run_spec::RunSpec;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::{self, test_support::*};

    fn spec(name: &str) -> RunSpec {
        RunSpec {
            name: name.to_string(),
            asset_name: "BTC-USD".to_string(),
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-08".to_string(),
            interval: "1h".to_string(),
            script_name: "strategy_a.py".to_string(),
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_get_task_returns_state_and_log() {
        let root = TempDir::new().unwrap();
        let deployment = deployment(&root, "echo done >&2\n");
        let task_id = Uuid::new_v4();
        deployment.pipeline().run(task_id, spec("first")).await.unwrap();

        let response = routes::router(deployment)
            .oneshot(get(&format!("/api/tasks/{task_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let task = &json["data"];
        assert_eq!(task["id"], task_id.to_string());
        assert_eq!(task["state"], "succeeded");
        assert_eq!(task["run"]["name"], "first");
        assert!(task["finished_at"].is_string());

        let log = task["log"].as_array().unwrap();
        assert!(log.contains(&serde_json::json!({ "type": "stderr", "content": "done" })));
        assert_eq!(log.last().unwrap()["type"], "finished");
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let root = TempDir::new().unwrap();
        let response = routes::router(deployment(&root, "echo ok\n"))
            .oneshot(get(&format!("/api/tasks/{}", Uuid::new_v4())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["message"].as_str().unwrap().starts_with("Unknown task"));
    }

    #[tokio::test]
    async fn test_list_tasks() {
        let root = TempDir::new().unwrap();
        let deployment = deployment(&root, "echo ok\n");
        deployment.pipeline().run(Uuid::new_v4(), spec("first")).await.unwrap();
        deployment.pipeline().run(Uuid::new_v4(), spec("second")).await.unwrap();

        let response = routes::router(deployment)
            .oneshot(get("/api/tasks"))
            .await
            .unwrap();
        let json = body_json(response).await;
        let tasks = json["data"].as_array().unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0]["run"]["name"], "second");
        assert!(tasks[0].get("log").is_none());
    }
}
