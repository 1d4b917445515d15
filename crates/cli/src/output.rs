//! Output formatting and terminal rendering

use colored::Colorize;

use crate::api::{LogEntry, TaskDetails, TaskSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Error,
    Success,
    Stage,
    Plain,
}

/// Classify a progress line by what the pipeline writes at each step.
pub fn line_kind(line: &str) -> LineKind {
    if line.starts_with("error:") {
        LineKind::Error
    } else if line == "Run successful!" {
        LineKind::Success
    } else if line == "Importing Data..." || line.starts_with("Imported data successfully") {
        LineKind::Stage
    } else {
        LineKind::Plain
    }
}

pub fn print_line(line: &str) {
    match line_kind(line) {
        LineKind::Error => println!("{}", line.red().bold()),
        LineKind::Success => println!("{}", line.green().bold()),
        LineKind::Stage => println!("{}", line.cyan()),
        LineKind::Plain => println!("{}", line),
    }
}

fn colored_state(state: &str) -> String {
    match state {
        "succeeded" => state.green().to_string(),
        "failed" => state.red().to_string(),
        "pending" => state.dimmed().to_string(),
        _ => state.yellow().to_string(),
    }
}

pub fn print_submitted(task_id: &uuid::Uuid) {
    println!("{} {}", "Task".dimmed(), task_id.to_string().bright_white());
}

pub fn print_task(details: &TaskDetails, show_stream: bool) {
    let summary = &details.summary;
    println!("{} {}", "Task:".bold(), summary.id);
    if let Some(run) = &summary.run {
        println!(
            "{} {} on {} ({} to {}, {})",
            "Run:".bold(),
            run.script_name,
            run.asset_name,
            run.start_date,
            run.end_date,
            run.interval
        );
    }
    println!("{} {}", "State:".bold(), colored_state(&summary.state));
    println!(
        "{} {}",
        "Started:".bold(),
        summary.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(finished_at) = summary.finished_at {
        println!(
            "{} {}",
            "Finished:".bold(),
            finished_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();

    for entry in &details.log {
        let (tag, line) = match entry {
            LogEntry::Stdout(line) => ("stdout", line),
            LogEntry::Stderr(line) => ("stderr", line),
            LogEntry::Info(line) => ("info", line),
            LogEntry::Finished => continue,
        };
        if show_stream {
            print!("{} ", format!("[{:>6}]", tag).dimmed());
        }
        print_line(line);
    }
}

pub fn print_tasks(tasks: &[TaskSummary]) {
    if tasks.is_empty() {
        println!("{}", "No tasks".dimmed());
        return;
    }
    for task in tasks {
        let label = task
            .run
            .as_ref()
            .map(|run| format!("{} ({} on {})", run.name, run.script_name, run.asset_name))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<10}  {}  {}",
            task.id.to_string().dimmed(),
            colored_state(&task.state),
            task.created_at.format("%Y-%m-%d %H:%M"),
            label
        );
    }
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}
