use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{run_spec::RunSpecError, task_logs::TaskLogError};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    TaskLog(#[from] TaskLogError),
    #[error(transparent)]
    RunSpec(#[from] RunSpecError),
    #[error("Invalid request body: {0}")]
    Body(#[from] JsonRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            ApiError::TaskLog(err) => match err {
                TaskLogError::UnknownTask(_) => StatusCode::NOT_FOUND,
                TaskLogError::AlreadyClaimed(_) | TaskLogError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
            },
            ApiError::RunSpec(_) | ApiError::Body(_) => StatusCode::BAD_REQUEST,
        };

        let error_message = match &self {
            ApiError::Body(rejection) => rejection.body_text(),
            _ => self.to_string(),
        };
        tracing::debug!("Request failed with {}: {}", status_code, error_message);
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::routes::test_support::body_json;

    #[tokio::test]
    async fn test_task_errors_map_to_status() {
        let id = Uuid::new_v4();

        let response = ApiError::from(TaskLogError::UnknownTask(id)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::from(TaskLogError::AlreadyClaimed(id)).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], format!("Task {id} already has a run"));
    }

    #[tokio::test]
    async fn test_run_spec_error_is_bad_request() {
        let response = ApiError::from(RunSpecError::MissingField("endDate")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Missing required field: endDate"
        );
    }
}
