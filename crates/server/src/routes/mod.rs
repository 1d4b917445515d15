use axum::{Router, middleware, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{DeploymentImpl, middleware as app_middleware};

pub mod health;
pub mod runs;
pub mod tasks;
pub mod updates;

pub fn router(deployment: DeploymentImpl) -> Router {
    let base_routes = Router::new()
        .route("/health", get(health::health_check))
        .merge(runs::router(&deployment))
        .merge(updates::router(&deployment))
        .merge(tasks::router(&deployment))
        .with_state(deployment);

    Router::new()
        .nest("/api", base_routes)
        .layer(middleware::from_fn(app_middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
