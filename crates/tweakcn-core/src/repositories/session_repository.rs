use std::future::Future;
use std::pin::Pin;

use super::error::RepositoryResult;
use crate::models::ChatSession;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage for chat sessions. Ownership checks live in the service layer;
/// the repository only stores rows.
pub trait SessionRepository: Send + Sync + 'static {
    /// Sessions of `user_id`, newest first.
    fn list_for_user(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<ChatSession>>>;

    fn find(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<ChatSession>>>;

    fn insert(&self, session: ChatSession) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Replaces the stored row with the same id.
    fn update(&self, session: ChatSession) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Returns whether a row was removed.
    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<bool>>;
}
