use std::sync::Arc;

use async_trait::async_trait;

use super::auth::Caller;
use super::session_service::SessionService;
use crate::error::ChatResult;
use crate::models::{
    ChatSession, CreateSessionInput, DeleteSessionInput, DeleteSessionOutput, UpdateSessionInput,
};

/// Client-side view of the session procedures.
#[async_trait]
pub trait SessionClient: Send + Sync {
    async fn get(&self) -> ChatResult<Vec<ChatSession>>;
    async fn create(&self, input: CreateSessionInput) -> ChatResult<ChatSession>;
    async fn update(&self, input: UpdateSessionInput) -> ChatResult<ChatSession>;
    async fn delete(&self, input: DeleteSessionInput) -> ChatResult<DeleteSessionOutput>;
}

/// Calls the procedures in-process on behalf of a fixed caller.
pub struct LocalSessionClient {
    service: Arc<SessionService>,
    caller: Caller,
}

impl LocalSessionClient {
    pub fn new(service: Arc<SessionService>, caller: Caller) -> Self {
        Self { service, caller }
    }
}

#[async_trait]
impl SessionClient for LocalSessionClient {
    async fn get(&self) -> ChatResult<Vec<ChatSession>> {
        self.service.get(&self.caller).await
    }

    async fn create(&self, input: CreateSessionInput) -> ChatResult<ChatSession> {
        self.service.create(&self.caller, input).await
    }

    async fn update(&self, input: UpdateSessionInput) -> ChatResult<ChatSession> {
        self.service.update(&self.caller, input).await
    }

    async fn delete(&self, input: DeleteSessionInput) -> ChatResult<DeleteSessionOutput> {
        self.service.delete(&self.caller, input).await
    }
}
