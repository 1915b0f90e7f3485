use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::error::{RepositoryError, RepositoryResult};
use super::session_repository::{BoxFuture, SessionRepository};
use crate::models::ChatSession;

/// In-memory repository for chat sessions
/// Useful for testing and development
#[derive(Clone)]
pub struct InMemorySessionRepository {
    sessions: Arc<Mutex<HashMap<String, ChatSession>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_error(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::InvalidData {
        message: format!("Failed to lock sessions: {}", e),
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn list_for_user(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<ChatSession>>> {
        let sessions = self.sessions.clone();
        let user_id = user_id.to_string();

        Box::pin(async move {
            let store = sessions.lock().map_err(lock_error)?;

            let mut result: Vec<ChatSession> = store
                .values()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect();

            // Newest first
            result.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            Ok(result)
        })
    }

    fn find(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<ChatSession>>> {
        let sessions = self.sessions.clone();
        let id = id.to_string();

        Box::pin(async move {
            let store = sessions.lock().map_err(lock_error)?;
            Ok(store.get(&id).cloned())
        })
    }

    fn insert(&self, session: ChatSession) -> BoxFuture<'static, RepositoryResult<()>> {
        let sessions = self.sessions.clone();

        Box::pin(async move {
            let mut store = sessions.lock().map_err(lock_error)?;
            store.insert(session.id.clone(), session);
            Ok(())
        })
    }

    fn update(&self, session: ChatSession) -> BoxFuture<'static, RepositoryResult<()>> {
        let sessions = self.sessions.clone();

        Box::pin(async move {
            let mut store = sessions.lock().map_err(lock_error)?;
            match store.get_mut(&session.id) {
                Some(existing) => {
                    *existing = session;
                    Ok(())
                }
                None => Err(RepositoryError::InvalidData {
                    message: format!("Session {} does not exist", session.id),
                }),
            }
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<bool>> {
        let sessions = self.sessions.clone();
        let id = id.to_string();

        Box::pin(async move {
            let mut store = sessions.lock().map_err(lock_error)?;
            Ok(store.remove(&id).is_some())
        })
    }
}
