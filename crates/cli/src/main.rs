//! backtest - command-line client for the backtest runner
//!
//! Submits runs to the server and prints their progress as it streams in.

mod api;
mod commands;
mod config;
mod events;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::api::RunSpec;

#[derive(Parser)]
#[command(name = "backtest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Submit backtest runs and follow their progress")]
#[command(long_about = r#"
Submits backtest runs to a backtest server and follows their progress.

Each run imports market data for an asset, then runs an analysis script
against it. Output is printed line by line as the server reports it.

Examples:
  backtest run --name t1 --asset EURUSD=X --start 2024-01-01 --end 2024-02-01 \
      --interval 5m --script strategy_a.py
  backtest follow 6f1c1c0e-8c1e-4d5e-9a55-1f6f0a2f9d10
  backtest status 6f1c1c0e-8c1e-4d5e-9a55-1f6f0a2f9d10
"#)]
struct Cli {
    /// Server URL (defaults to server.url from the config file)
    #[arg(long, env = "BACKTEST_SERVER_URL")]
    server: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a run and follow it until it finishes
    Run {
        /// Display name of the run
        #[arg(long)]
        name: String,

        /// Instrument to import, e.g. EURUSD=X
        #[arg(short, long)]
        asset: String,

        /// First date of the data range
        #[arg(long)]
        start: String,

        /// Last date of the data range
        #[arg(long)]
        end: String,

        /// Sampling interval, e.g. 5m or 1d
        #[arg(short, long)]
        interval: String,

        /// Analysis script file name
        #[arg(short, long)]
        script: String,

        /// Print the task id and return without following
        #[arg(long)]
        detach: bool,
    },

    /// Follow the progress of an existing task
    Follow { task_id: Uuid },

    /// Show a task's state and full log
    Status { task_id: Uuid },

    /// List known tasks, newest first
    Tasks,

    /// Check that the server is reachable
    Health,

    /// Configuration management
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Set a configuration value (key=value)
        #[arg(long)]
        set: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("backtest={},warn", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = config::Config::load()?;
    if !config.display.color {
        colored::control::set_override(false);
    }
    let server_url = cli.server.clone().unwrap_or_else(|| config.server.url.clone());
    tracing::debug!("Using server {}", server_url);
    let api = api::ApiClient::new(&server_url);

    match cli.command {
        Commands::Run {
            name,
            asset,
            start,
            end,
            interval,
            script,
            detach,
        } => {
            let spec = RunSpec {
                name,
                asset_name: asset,
                start_date: start,
                end_date: end,
                interval,
                script_name: script,
            };
            commands::run(&api, &spec, detach).await
        }
        Commands::Follow { task_id } => commands::follow(&api, task_id).await,
        Commands::Status { task_id } => commands::status(&api, task_id, &config).await,
        Commands::Tasks => commands::list_tasks(&api).await,
        Commands::Health => commands::health(&api).await,
        Commands::Config { show, set } => {
            match set {
                Some(kv) if !show => commands::set_config(&mut config, &kv)?,
                _ => commands::show_config(&config)?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
