pub mod archive;
pub mod config;
pub mod pipeline;
pub mod progress;
pub mod run_spec;
pub mod task_logs;
