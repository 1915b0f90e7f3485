use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::broadcast;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

/// A user-visible notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub description: Option<String>,
}

/// Collects toasts raised by the pipeline and fans them out to listeners.
pub struct ToastStore {
    history: Mutex<VecDeque<Toast>>,
    max_entries: usize,
    tx: broadcast::Sender<Toast>,
}

impl ToastStore {
    pub fn new(max_entries: usize) -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            history: Mutex::new(VecDeque::new()),
            max_entries,
            tx,
        }
    }

    pub fn success(&self, title: &str, description: Option<&str>) {
        self.push(ToastLevel::Success, title, description);
    }

    pub fn error(&self, title: &str, description: Option<&str>) {
        self.push(ToastLevel::Error, title, description);
    }

    fn push(&self, level: ToastLevel, title: &str, description: Option<&str>) {
        let toast = Toast {
            level,
            title: title.to_string(),
            description: description.map(str::to_string),
        };

        {
            let mut history = self.history.lock();
            history.push_back(toast.clone());
            while history.len() > self.max_entries {
                history.pop_front();
            }
        }

        // No listener is fine; history keeps the toast.
        let _ = self.tx.send(toast);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.tx.subscribe()
    }

    pub fn history(&self) -> Vec<Toast> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn errors(&self) -> Vec<Toast> {
        self.history
            .lock()
            .iter()
            .filter(|t| t.level == ToastLevel::Error)
            .cloned()
            .collect()
    }
}

impl Default for ToastStore {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toasts_reach_history_and_subscribers() {
        let store = ToastStore::new(10);
        let mut rx = store.subscribe();

        store.error("An error occurred", Some("Rate limited"));
        store.success("Chat deleted", None);

        assert_eq!(rx.recv().await.unwrap().title, "An error occurred");
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.errors().len(), 1);
    }
}
