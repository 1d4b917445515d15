//! API client for the backtest server
//!
//! Handles all HTTP communication with the server, including following a
//! task's server-sent progress stream.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{SseEvent, SseParser};

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<Health> {
        let resp = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;
        if !resp.status().is_success() {
            anyhow::bail!("Health check failed: {}", resp.status());
        }
        Ok(resp.json().await?)
    }

    /// Submit a run, returning its task id.
    pub async fn submit_run(&self, spec: &RunSpec) -> Result<Uuid> {
        let resp = self
            .client
            .post(self.url("/run"))
            .json(spec)
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;
        let accepted: RunAccepted = unwrap_envelope(resp, "submit run").await?;
        Ok(accepted.task_id)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<TaskDetails>> {
        let resp = self
            .client
            .get(self.url(&format!("/tasks/{}", id)))
            .send()
            .await
            .context("Failed to fetch task")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(unwrap_envelope(resp, "fetch task").await?))
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskSummary>> {
        let resp = self
            .client
            .get(self.url("/tasks"))
            .send()
            .await
            .context("Failed to fetch tasks")?;
        unwrap_envelope(resp, "fetch tasks").await
    }

    /// Stream a task's progress, calling `on_line` for every line. Returns
    /// whether the server signalled the end of the task before the connection
    /// closed.
    pub async fn follow<F>(&self, id: Uuid, mut on_line: F) -> Result<bool>
    where
        F: FnMut(&str),
    {
        let resp = self
            .client
            .get(self.url(&format!("/updates/{}", id)))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .context("Failed to open progress stream")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Failed to follow task {}: {} - {}", id, status, text);
        }

        let mut parser = SseParser::new();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("Progress stream interrupted")?;
            for event in parser.push(&chunk) {
                if handle_event(&event, &mut on_line) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

// Returns true once the stream is over.
fn handle_event<F: FnMut(&str)>(event: &SseEvent, on_line: &mut F) -> bool {
    if event.is_finished() {
        return true;
    }
    if event.event.is_none() {
        on_line(&event.data);
    } else {
        tracing::debug!("Ignoring event {:?}", event.event);
    }
    false
}

async fn unwrap_envelope<T: DeserializeOwned>(resp: Response, action: &str) -> Result<T> {
    let status = resp.status();
    let text = resp.text().await?;
    let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
        Ok(envelope) => envelope,
        Err(_) => anyhow::bail!("Failed to {}: {} - {}", action, status, text),
    };

    match envelope.data {
        Some(data) if envelope.success => Ok(data),
        _ => anyhow::bail!(
            "Failed to {}: {}",
            action,
            envelope.message.unwrap_or_else(|| status.to_string())
        ),
    }
}

// ============ Types ============

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub name: String,
    #[serde(rename = "assetName")]
    pub asset_name: String,
    #[serde(rename = "startDate")]
    pub start_date: String,
    #[serde(rename = "endDate")]
    pub end_date: String,
    pub interval: String,
    #[serde(rename = "backtest_fileName")]
    pub script_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RunAccepted {
    #[serde(rename = "taskId")]
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub state: String,
    #[serde(default)]
    pub run: Option<RunSpec>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub line_count: usize,
}

impl TaskSummary {
    pub fn succeeded(&self) -> bool {
        self.state == "succeeded"
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state.as_str(), "succeeded" | "failed")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskDetails {
    #[serde(flatten)]
    pub summary: TaskSummary,
    pub log: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum LogEntry {
    Stdout(String),
    Stderr(String),
    Info(String),
    Finished,
}
