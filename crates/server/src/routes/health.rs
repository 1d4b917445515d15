use axum::response::Json;
use serde_json::{Value, json};
use utils::version::APP_VERSION;

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "version": APP_VERSION }))
}
