//! Command implementations

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use uuid::Uuid;

use crate::{
    api::{ApiClient, RunSpec},
    config::Config,
    output,
};

/// Submit a run, then follow it unless `detach` is set.
pub async fn run(api: &ApiClient, spec: &RunSpec, detach: bool) -> Result<ExitCode> {
    let task_id = api.submit_run(spec).await?;
    output::print_submitted(&task_id);
    if detach {
        return Ok(ExitCode::SUCCESS);
    }
    follow(api, task_id).await
}

/// Print a task's progress until it finishes. Exits 0 only if it succeeded.
pub async fn follow(api: &ApiClient, task_id: Uuid) -> Result<ExitCode> {
    let finished = api.follow(task_id, output::print_line).await?;
    if !finished {
        anyhow::bail!("Connection closed before task {} finished", task_id);
    }

    match api.get_task(task_id).await? {
        Some(details) if details.summary.succeeded() => Ok(ExitCode::SUCCESS),
        Some(_) => Ok(ExitCode::FAILURE),
        // evicted between the end of the stream and now
        None => {
            tracing::warn!("Task {} is no longer known to the server", task_id);
            Ok(ExitCode::FAILURE)
        }
    }
}

pub async fn status(api: &ApiClient, task_id: Uuid, config: &Config) -> Result<ExitCode> {
    match api.get_task(task_id).await? {
        Some(details) => {
            output::print_task(&details, config.display.show_stream);
            let code = if details.summary.is_done() && !details.summary.succeeded() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            Ok(code)
        }
        None => {
            output::print_error(&format!("Task {} not found", task_id));
            Ok(ExitCode::FAILURE)
        }
    }
}

pub async fn list_tasks(api: &ApiClient) -> Result<ExitCode> {
    output::print_tasks(&api.list_tasks().await?);
    Ok(ExitCode::SUCCESS)
}

pub async fn health(api: &ApiClient) -> Result<ExitCode> {
    let health = api.health().await?;
    println!(
        "{} (version {})",
        health.status.green(),
        health.version.bright_white()
    );
    Ok(ExitCode::SUCCESS)
}

pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", format!("# {}", Config::config_path().display()).dimmed());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

pub fn set_config(config: &mut Config, kv: &str) -> Result<()> {
    let Some((key, value)) = kv.split_once('=') else {
        anyhow::bail!("Expected key=value, got {:?}", kv);
    };
    config.set(key.trim(), value.trim())?;
    config.save()?;
    println!("{} = {}", key.trim(), value.trim());
    Ok(())
}
