use std::fmt;

use tokio::sync::watch;

use super::message::ChatMessage;

/// Lifecycle of a streaming request. One tagged status instead of
/// loading/error flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StreamStatus {
    #[default]
    Idle,
    Streaming,
    Completed,
    /// Cancelled by the user. Benign.
    Aborted,
    /// Normalized, user-facing message.
    Error(String),
}

impl StreamStatus {
    pub fn is_streaming(&self) -> bool {
        matches!(self, StreamStatus::Streaming)
    }

    /// A status after which the message list is stable. Aborted runs keep
    /// their partial output, so they count as settled.
    pub fn is_settled(&self) -> bool {
        !self.is_streaming()
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStatus::Idle => write!(f, "idle"),
            StreamStatus::Streaming => write!(f, "streaming"),
            StreamStatus::Completed => write!(f, "completed"),
            StreamStatus::Aborted => write!(f, "aborted"),
            StreamStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub status: StreamStatus,
}

/// Live message list of the open chat plus the generation status.
///
/// Written by the generation stream and the session synchronizer; observers
/// subscribe to react after each completion.
pub struct ChatStore {
    tx: watch::Sender<ChatSnapshot>,
}

impl ChatStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ChatSnapshot::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.tx.borrow().clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.tx.borrow().messages.clone()
    }

    pub fn status(&self) -> StreamStatus {
        self.tx.borrow().status.clone()
    }

    pub fn set_messages(&self, messages: Vec<ChatMessage>) {
        self.tx.send_modify(|s| s.messages = messages);
    }

    pub fn push(&self, message: ChatMessage) {
        self.tx.send_modify(|s| s.messages.push(message));
    }

    /// Applies `f` to the message with `id`. Returns false if it is gone,
    /// e.g. after the chat was cleared mid-stream.
    pub fn update_message<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ChatMessage),
    {
        self.tx.send_if_modified(|s| match s.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                f(message);
                true
            }
            None => false,
        })
    }

    pub fn truncate(&self, len: usize) {
        self.tx.send_if_modified(|s| {
            if s.messages.len() > len {
                s.messages.truncate(len);
                true
            } else {
                false
            }
        });
    }

    pub fn set_status(&self, status: StreamStatus) {
        self.tx.send_modify(|s| s.status = status);
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}
