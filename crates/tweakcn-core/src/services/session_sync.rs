use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::session_client::SessionClient;
use super::theme_stream::ThemeGenerationStream;
use crate::models::session::{default_session_title_now, duplicate_title};
use crate::models::{
    ChatMessage, ChatSession, ChatStore, CreateSessionInput, DeleteSessionInput, ToastStore,
    UpdateSessionInput,
};

/// Which remote session the open chat is saved to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    None,
    /// The first create call is in flight.
    PendingCreate,
    Active(String),
}

enum SyncAction {
    Create,
    Update(String),
}

/// Keeps the open chat and its remote session in step.
///
/// Sessions are created lazily for the first settled message list, then
/// updated whenever the settled list differs from the last known remote copy.
pub struct SessionSynchronizer {
    client: Arc<dyn SessionClient>,
    chat: Arc<ChatStore>,
    generation: Arc<ThemeGenerationStream>,
    toasts: Arc<ToastStore>,
    state: Mutex<SessionState>,
    sessions: Mutex<Vec<ChatSession>>,
    // Held by sync and by every transition that swaps messages and state
    // together.
    transition: tokio::sync::Mutex<()>,
}

impl SessionSynchronizer {
    pub fn new(
        client: Arc<dyn SessionClient>,
        chat: Arc<ChatStore>,
        generation: Arc<ThemeGenerationStream>,
        toasts: Arc<ToastStore>,
    ) -> Self {
        Self {
            client,
            chat,
            generation,
            toasts,
            state: Mutex::new(SessionState::None),
            sessions: Mutex::new(Vec::new()),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn current_session_id(&self) -> Option<String> {
        match &*self.state.lock() {
            SessionState::Active(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Cached session list, newest first.
    pub fn sessions(&self) -> Vec<ChatSession> {
        self.sessions.lock().clone()
    }

    pub fn is_current_chat_saved(&self) -> bool {
        self.current_session_id()
            .is_some_and(|id| self.sessions.lock().iter().any(|s| s.id == id))
    }

    /// Re-runs [`sync`](Self::sync) after every change to the chat that
    /// leaves it settled. Ends once the synchronizer is dropped.
    pub fn spawn_observer(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::downgrade(self);
        let mut rx = self.chat.subscribe();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let settled = rx.borrow_and_update().status.is_settled();
                if !settled {
                    continue;
                }
                let Some(this) = this.upgrade() else {
                    break;
                };
                this.sync().await;
            }
            debug!("Session observer stopped");
        })
    }

    /// Pushes the settled message list to the remote session, creating it
    /// first if needed. No call is made when nothing changed.
    pub async fn sync(&self) {
        let _guard = self.transition.lock().await;

        loop {
            let snapshot = self.chat.snapshot();
            if !snapshot.status.is_settled() {
                return;
            }

            let action = {
                let mut state = self.state.lock();
                match &*state {
                    SessionState::PendingCreate => {
                        debug!("Session create already in flight");
                        return;
                    }
                    SessionState::None => {
                        if snapshot.messages.is_empty() {
                            return;
                        }
                        *state = SessionState::PendingCreate;
                        SyncAction::Create
                    }
                    SessionState::Active(id) => SyncAction::Update(id.clone()),
                }
            };

            match action {
                SyncAction::Create => {
                    // Messages may have moved on while creating.
                    if !self.create_current(snapshot.messages).await {
                        return;
                    }
                }
                SyncAction::Update(id) => {
                    self.update_current(&id, snapshot.messages).await;
                    return;
                }
            }
        }
    }

    async fn create_current(&self, messages: Vec<ChatMessage>) -> bool {
        let input = CreateSessionInput {
            title: default_session_title_now(),
            messages,
        };

        match self.client.create(input).await {
            Ok(session) => {
                let adopted = {
                    let mut state = self.state.lock();
                    if *state == SessionState::PendingCreate {
                        *state = SessionState::Active(session.id.clone());
                        true
                    } else {
                        false
                    }
                };
                info!(session_id = %session.id, adopted, "Created chat session");
                self.remember(session);
                self.invalidate_sessions().await;
                adopted
            }
            Err(e) => {
                error!(error = %e, "Failed to create chat session");
                let mut state = self.state.lock();
                if *state == SessionState::PendingCreate {
                    *state = SessionState::None;
                }
                false
            }
        }
    }

    async fn update_current(&self, id: &str, messages: Vec<ChatMessage>) {
        let unchanged = self
            .sessions
            .lock()
            .iter()
            .find(|s| s.id == id)
            .is_some_and(|s| s.messages == messages);
        if unchanged {
            debug!(session_id = %id, "Session messages unchanged, skipping update");
            return;
        }

        let input = UpdateSessionInput {
            id: id.to_string(),
            title: None,
            messages: Some(messages),
        };
        match self.client.update(input).await {
            Ok(session) => {
                debug!(session_id = %id, "Updated session messages");
                self.remember(session);
                self.invalidate_sessions().await;
            }
            // Stays stale until the next differing update succeeds.
            Err(e) => warn!(session_id = %id, error = %e, "Failed to update session messages"),
        }
    }

    /// Opens a cached session. No-op when it is already open or unknown.
    pub async fn set_current_session(&self, id: &str) -> bool {
        let _guard = self.transition.lock().await;
        self.open_session(id)
    }

    fn open_session(&self, id: &str) -> bool {
        if self.current_session_id().as_deref() == Some(id) {
            return false;
        }
        let Some(session) = self.sessions.lock().iter().find(|s| s.id == id).cloned() else {
            debug!(session_id = %id, "Ignoring switch to unknown session");
            return false;
        };

        self.generation.stop();
        *self.state.lock() = SessionState::Active(session.id.clone());
        self.chat.set_messages(session.messages);
        info!(session_id = %id, "Switched chat session");
        true
    }

    /// Stops any generation and leaves an empty, unsaved chat.
    pub async fn start_new_chat(&self) {
        // A sync may hold the lock for a whole create call.
        self.generation.stop();
        let _guard = self.transition.lock().await;
        self.reset_chat();
    }

    fn reset_chat(&self) {
        self.generation.stop();
        self.chat.set_messages(Vec::new());
        *self.state.lock() = SessionState::None;
        debug!("Started new chat");
    }

    /// Drops the open chat first when `id` is current, then deletes remotely.
    pub async fn delete_session(&self, id: &str) -> bool {
        if self.current_session_id().as_deref() == Some(id) {
            self.start_new_chat().await;
        }

        match self.client.delete(DeleteSessionInput { id: id.to_string() }).await {
            Ok(_) => {
                info!(session_id = %id, "Deleted chat session");
                self.sessions.lock().retain(|s| s.id != id);
                self.toasts.success(
                    "Chat deleted",
                    Some("The chat has been permanently deleted."),
                );
                self.invalidate_sessions().await;
                true
            }
            Err(e) => {
                error!(session_id = %id, error = %e, "Failed to delete chat session");
                self.toasts.error("Error", Some("Failed to delete chat session"));
                false
            }
        }
    }

    /// Copies a session under `"<title> (Duplicate)"` and opens the copy.
    pub async fn duplicate_session(&self, id: &str) -> Option<String> {
        let Some(original) = self.sessions.lock().iter().find(|s| s.id == id).cloned() else {
            warn!(session_id = %id, "Cannot duplicate unknown session");
            self.toasts.error("Error", Some("Failed to duplicate chat session"));
            return None;
        };

        let input = CreateSessionInput {
            title: duplicate_title(&original.title),
            messages: original.messages,
        };
        match self.client.create(input).await {
            Ok(copy) => {
                let copy_id = copy.id.clone();
                self.remember(copy);
                self.invalidate_sessions().await;
                self.set_current_session(&copy_id).await;
                self.toasts.success("Success", Some("Chat session duplicated"));
                Some(copy_id)
            }
            Err(e) => {
                error!(session_id = %id, error = %e, "Failed to duplicate chat session");
                self.toasts.error("Error", Some("Failed to duplicate chat session"));
                None
            }
        }
    }

    pub async fn rename_session(&self, id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }

        let input = UpdateSessionInput {
            id: id.to_string(),
            title: Some(title.to_string()),
            messages: None,
        };
        match self.client.update(input).await {
            Ok(session) => {
                self.remember(session);
                self.invalidate_sessions().await;
                self.toasts.success("Chat renamed!", Some("Your chat name has been updated."));
                true
            }
            Err(e) => {
                error!(session_id = %id, error = %e, "Failed to rename chat session");
                self.toasts.error("Error", Some("Failed to rename chat session"));
                false
            }
        }
    }

    /// Keeps the first `index` messages. The next sync pushes the cut.
    pub fn reset_messages_up_to_index(&self, index: usize) {
        self.chat.truncate(index);
    }

    /// Refetches the session list. Failures keep the old list.
    pub async fn invalidate_sessions(&self) {
        match self.client.get().await {
            Ok(sessions) => *self.sessions.lock() = sessions,
            Err(e) => warn!(error = %e, "Failed to refresh chat sessions"),
        }
    }

    fn remember(&self, session: ChatSession) {
        let mut sessions = self.sessions.lock();
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session,
            None => sessions.insert(0, session),
        }
    }
}
