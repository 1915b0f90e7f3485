use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::ai_service::ThemeAiService;
use super::auth::Caller;
use super::model_provider::{ResponseStream, TextStream};
use crate::error::ChatResult;
use crate::models::{AIPromptData, ChatMessage, SubscriptionStatus};

/// How the client reaches the generation and enhancement endpoints.
/// Dropping a returned stream abandons the request.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn generate_theme(
        &self,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> ChatResult<ResponseStream>;

    async fn enhance_prompt(
        &self,
        prompt: AIPromptData,
        cancel: CancellationToken,
    ) -> ChatResult<TextStream>;

    async fn subscription_status(&self) -> ChatResult<SubscriptionStatus>;
}

/// In-process transport straight into [`ThemeAiService`].
pub struct LocalTransport {
    service: Arc<ThemeAiService>,
    caller: Caller,
}

impl LocalTransport {
    pub fn new(service: Arc<ThemeAiService>, caller: Caller) -> Self {
        Self { service, caller }
    }
}

#[async_trait]
impl GenerationTransport for LocalTransport {
    async fn generate_theme(
        &self,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> ChatResult<ResponseStream> {
        self.service
            .generate_theme(&self.caller, messages, cancel)
            .await
    }

    async fn enhance_prompt(
        &self,
        prompt: AIPromptData,
        cancel: CancellationToken,
    ) -> ChatResult<TextStream> {
        self.service.enhance_prompt(prompt, cancel).await
    }

    async fn subscription_status(&self) -> ChatResult<SubscriptionStatus> {
        self.service.subscription_status(&self.caller).await
    }
}
