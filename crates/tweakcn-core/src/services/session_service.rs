use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::Caller;
use crate::error::{ChatError, ChatResult};
use crate::models::{
    ChatSession, CreateSessionInput, DeleteSessionInput, DeleteSessionOutput, UpdateSessionInput,
};
use crate::repositories::SessionRepository;

const MIN_LENGTH_MESSAGE: &str = "String must contain at least 1 character(s)";

/// Remote procedures over chat sessions. Every mutation is scoped to the
/// calling user.
pub struct SessionService {
    repo: Arc<dyn SessionRepository>,
}

impl SessionService {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self { repo }
    }

    /// Sessions of the caller, newest first. Anonymous callers get none.
    pub async fn get(&self, caller: &Caller) -> ChatResult<Vec<ChatSession>> {
        let Some(user_id) = caller.user_id.as_deref() else {
            return Ok(Vec::new());
        };
        Ok(self.repo.list_for_user(user_id).await?)
    }

    pub async fn create(&self, caller: &Caller, input: CreateSessionInput) -> ChatResult<ChatSession> {
        let user_id = caller.require_user()?;
        require_non_empty("title", &input.title)?;

        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: input.title,
            messages: input.messages,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert(session.clone()).await?;

        info!(session_id = %session.id, user_id = %user_id, "Created chat session");
        Ok(session)
    }

    pub async fn update(&self, caller: &Caller, input: UpdateSessionInput) -> ChatResult<ChatSession> {
        let user_id = caller.require_user()?;
        require_non_empty("id", &input.id)?;
        if let Some(title) = &input.title {
            require_non_empty("title", title)?;
        }

        let mut session = self.owned_session(user_id, &input.id).await?;
        if let Some(title) = input.title {
            session.title = title;
        }
        if let Some(messages) = input.messages {
            session.messages = messages;
        }
        session.updated_at = Utc::now();

        self.repo.update(session.clone()).await?;
        Ok(session)
    }

    pub async fn delete(&self, caller: &Caller, input: DeleteSessionInput) -> ChatResult<DeleteSessionOutput> {
        let user_id = caller.require_user()?;
        require_non_empty("id", &input.id)?;

        self.owned_session(user_id, &input.id).await?;
        self.repo.delete(&input.id).await?;

        info!(session_id = %input.id, "Deleted chat session");
        Ok(DeleteSessionOutput { success: true })
    }

    async fn owned_session(&self, user_id: &str, id: &str) -> ChatResult<ChatSession> {
        let session = self
            .repo
            .find(id)
            .await?
            .ok_or_else(ChatError::session_not_found)?;

        if session.user_id != user_id {
            warn!(session_id = %id, "Rejected access to a session owned by another user");
            return Err(ChatError::unauthorized());
        }
        Ok(session)
    }
}

fn require_non_empty(field: &str, value: &str) -> ChatResult<()> {
    if value.is_empty() {
        return Err(ChatError::validation(
            "Invalid input",
            Some(json!({ field: [MIN_LENGTH_MESSAGE] })),
        ));
    }
    Ok(())
}
