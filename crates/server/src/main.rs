use anyhow::Error as AnyhowError;
use deployment::{Deployment, DeploymentError};
use server::{DeploymentImpl, routes};
use strip_ansi_escapes::strip;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, prelude::*};

const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Error)]
pub enum BacktestServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

fn port_from_env() -> Option<u16> {
    let raw = std::env::var("BACKEND_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()?;
    // remove any ANSI codes left by launch scripts
    let cleaned = String::from_utf8_lossy(&strip(raw.as_bytes())).into_owned();
    cleaned.trim().parse::<u16>().ok()
}

#[tokio::main]
async fn main() -> Result<(), BacktestServerError> {
    dotenv::dotenv().ok();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,server={level},services={level},executors={level},deployment={level},local_deployment={level},utils={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).map_err(AnyhowError::from)?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let deployment = DeploymentImpl::new().await?;
    let app_router = routes::router(deployment);

    let port = port_from_env().unwrap_or_else(|| {
        tracing::info!("No PORT environment variable set, using port {}", DEFAULT_PORT);
        DEFAULT_PORT
    });
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    let actual_port = listener.local_addr()?.port();

    tracing::info!("Server running on http://{host}:{actual_port}");

    axum::serve(listener, app_router).await?;
    Ok(())
}
