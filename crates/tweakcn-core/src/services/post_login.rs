use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostLoginActionKind {
    AiGenerateFromChat,
    AiGenerateFromPage,
}

impl fmt::Display for PostLoginActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostLoginActionKind::AiGenerateFromChat => write!(f, "AI_GENERATE_FROM_CHAT"),
            PostLoginActionKind::AiGenerateFromPage => write!(f, "AI_GENERATE_FROM_PAGE"),
        }
    }
}

/// Work deferred until the user signs in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostLoginAction {
    pub kind: PostLoginActionKind,
    pub payload: serde_json::Value,
}

pub type PostLoginHandler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A single pending action plus the handlers able to run it.
#[derive(Default)]
pub struct PostLoginQueue {
    slot: Mutex<Option<PostLoginAction>>,
    handlers: Mutex<HashMap<PostLoginActionKind, PostLoginHandler>>,
}

impl PostLoginQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: PostLoginActionKind, handler: PostLoginHandler) {
        self.handlers.lock().insert(kind, handler);
    }

    /// Stores `action`, replacing whatever was pending.
    pub fn enqueue(&self, kind: PostLoginActionKind, payload: serde_json::Value) {
        let previous = self.slot.lock().replace(PostLoginAction { kind, payload });
        if let Some(previous) = previous {
            debug!(kind = %previous.kind, "Replacing pending post-login action");
        }
        info!(kind = %kind, "Queued post-login action");
    }

    pub fn pending(&self) -> Option<PostLoginAction> {
        self.slot.lock().clone()
    }

    /// Runs the pending action once. The slot is cleared before the handler
    /// runs, whatever its outcome. Returns whether a handler ran.
    pub async fn on_authenticated(&self) -> bool {
        let Some(action) = self.slot.lock().take() else {
            return false;
        };

        let handler = self.handlers.lock().get(&action.kind).cloned();
        let Some(handler) = handler else {
            warn!(kind = %action.kind, "No handler registered for post-login action");
            return false;
        };

        info!(kind = %action.kind, "Running post-login action");
        if let Err(e) = handler(action.payload).await {
            error!(kind = %action.kind, error = ?e, "Post-login action failed");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recording_handler(seen: Arc<Mutex<Vec<serde_json::Value>>>, fail: bool) -> PostLoginHandler {
        Arc::new(move |payload| -> BoxFuture<'static, anyhow::Result<()>> {
            let seen = seen.clone();
            Box::pin(async move {
                seen.lock().push(payload);
                if fail {
                    anyhow::bail!("generation refused");
                }
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn latest_action_runs_exactly_once() {
        let queue = PostLoginQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        queue.register(PostLoginActionKind::AiGenerateFromChat, recording_handler(seen.clone(), false));

        queue.enqueue(PostLoginActionKind::AiGenerateFromChat, json!({ "prompt": "red" }));
        queue.enqueue(PostLoginActionKind::AiGenerateFromChat, json!({ "prompt": "blue" }));

        assert!(queue.on_authenticated().await);
        assert!(!queue.on_authenticated().await);
        assert_eq!(*seen.lock(), vec![json!({ "prompt": "blue" })]);
    }

    #[tokio::test]
    async fn failing_action_is_still_cleared() {
        let queue = PostLoginQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        queue.register(PostLoginActionKind::AiGenerateFromChat, recording_handler(seen.clone(), true));
        queue.enqueue(PostLoginActionKind::AiGenerateFromChat, json!({}));

        assert!(queue.on_authenticated().await);
        assert!(queue.pending().is_none());
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn action_without_handler_is_dropped() {
        let queue = PostLoginQueue::new();
        queue.enqueue(PostLoginActionKind::AiGenerateFromPage, json!({}));

        assert!(!queue.on_authenticated().await);
        assert!(queue.pending().is_none());
    }

    #[test]
    fn kinds_serialize_like_the_web_client() {
        assert_eq!(
            serde_json::to_value(PostLoginActionKind::AiGenerateFromChat).unwrap(),
            json!("AI_GENERATE_FROM_CHAT")
        );
    }
}
