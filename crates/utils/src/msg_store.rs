use std::{
    io,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_stream::stream;
use futures::stream::BoxStream;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::log_msg::LogMsg;

// Live fan-out buffer per store. A receiver that falls further behind than
// this catches up from history instead of losing lines.
const LIVE_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
struct Sequenced {
    seq: u64,
    msg: LogMsg,
}

#[derive(Debug, Default)]
struct Inner {
    history: Vec<Sequenced>,
    finished: bool,
}

/// Ordered, append-only message log with live fan-out.
///
/// Every message gets a sequence number equal to its position in history.
/// Subscribers snapshot history and subscribe to the live channel under the
/// same lock `push` takes, so a message is either in the snapshot or arrives
/// live, never both and never neither.
#[derive(Debug)]
pub struct MsgStore {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<Sequenced>,
}

impl Default for MsgStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgStore {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            sender,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message. Messages pushed after `Finished` are dropped.
    pub fn push(&self, msg: LogMsg) {
        let mut inner = self.write();
        if inner.finished {
            tracing::debug!("Dropping {} message pushed after finish", msg.name());
            return;
        }

        let entry = Sequenced {
            seq: inner.history.len() as u64,
            msg,
        };
        inner.finished = entry.msg.is_finished();
        inner.history.push(entry.clone());

        // no receivers is fine, history still has it
        let _ = self.sender.send(entry);
    }

    pub fn push_info<S: Into<String>>(&self, line: S) {
        self.push(LogMsg::Info(line.into()));
    }

    pub fn push_finished(&self) {
        self.push(LogMsg::Finished);
    }

    pub fn get_history(&self) -> Vec<LogMsg> {
        self.read()
            .history
            .iter()
            .map(|entry| entry.msg.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of text lines, not counting the end marker.
    pub fn line_count(&self) -> usize {
        self.read()
            .history
            .iter()
            .filter(|entry| entry.msg.line().is_some())
            .count()
    }

    /// Number of live subscribers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn history_from(&self, seq: u64) -> Vec<Sequenced> {
        let inner = self.read();
        let start = (seq as usize).min(inner.history.len());
        inner.history[start..].to_vec()
    }

    /// Full history followed by live messages, ending after `Finished`.
    pub fn history_plus_stream(self: &Arc<Self>) -> BoxStream<'static, Result<LogMsg, io::Error>> {
        let (history, mut rx) = {
            let inner = self.read();
            (inner.history.clone(), self.sender.subscribe())
        };
        let store = Arc::clone(self);

        Box::pin(stream! {
            let mut next_seq = 0u64;

            for entry in history {
                next_seq = entry.seq + 1;
                let done = entry.msg.is_finished();
                yield Ok::<_, io::Error>(entry.msg);
                if done {
                    return;
                }
            }

            loop {
                let backlog = match rx.recv().await {
                    Ok(entry) if entry.seq < next_seq => continue,
                    Ok(entry) if entry.seq == next_seq => vec![entry],
                    // a gap, fill it from history
                    Ok(_) => store.history_from(next_seq),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Subscriber lagged by {skipped} messages, catching up from history");
                        store.history_from(next_seq)
                    }
                    Err(RecvError::Closed) => return,
                };

                for entry in backlog {
                    next_seq = entry.seq + 1;
                    let done = entry.msg.is_finished();
                    yield Ok::<_, io::Error>(entry.msg);
                    if done {
                        return;
                    }
                }
            }
        })
    }
}
