use axum::response::sse::Event;
use serde::{Deserialize, Serialize};

pub const EV_FINISHED: &str = "finished";

/// One entry of a task log.
///
/// Process output keeps the stream it came from so separated views stay
/// possible later; observers of the progress stream only ever see the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum LogMsg {
    Stdout(String),
    Stderr(String),
    /// Lines written by the pipeline itself (stage transitions, results).
    Info(String),
    /// End-of-log marker, pushed once when the task reaches a terminal state.
    Finished,
}

impl LogMsg {
    pub fn name(&self) -> &'static str {
        match self {
            LogMsg::Stdout(_) => "stdout",
            LogMsg::Stderr(_) => "stderr",
            LogMsg::Info(_) => "info",
            LogMsg::Finished => EV_FINISHED,
        }
    }

    /// The text carried by this entry, `None` for the end marker.
    pub fn line(&self) -> Option<&str> {
        match self {
            LogMsg::Stdout(line) | LogMsg::Stderr(line) | LogMsg::Info(line) => Some(line),
            LogMsg::Finished => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, LogMsg::Finished)
    }

    /// Lines go out as unnamed events so `EventSource.onmessage` receives
    /// every one of them; the end marker is a named `finished` event.
    pub fn to_sse_event(&self) -> Event {
        match self.line() {
            // carriage returns are not allowed inside an SSE field
            Some(line) => Event::default().data(line.replace('\r', "\n")),
            None => Event::default().event(EV_FINISHED).data(""),
        }
    }
}
