use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::auth::Caller;
use super::model_provider::{ModelProvider, ResponseStream, StreamChunk, TextStream};
use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::models::{AIPromptData, ChatMessage, SubscriptionStatus, TokenUsage, UsageRecord};
use crate::repositories::UsageRepository;

/// Shown in place of provider failure details.
pub const GENERATION_FAILED_MESSAGE: &str = "Failed to generate theme. Please try again.";

/// Server-side entry points for generation and enhancement. Wraps the model
/// provider with validation, cancellation and usage accounting.
pub struct ThemeAiService {
    provider: Arc<dyn ModelProvider>,
    usage: Arc<dyn UsageRepository>,
    max_steps: usize,
}

impl ThemeAiService {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        usage: Arc<dyn UsageRepository>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            provider,
            usage,
            max_steps: config.max_generation_steps,
        }
    }

    /// Starts a theme generation. The returned stream ends early, without a
    /// `Done` chunk, once `cancel` fires.
    pub async fn generate_theme(
        &self,
        caller: &Caller,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> ChatResult<ResponseStream> {
        if messages.is_empty() {
            return Err(ChatError::validation(
                "Invalid input",
                Some(serde_json::json!({ "messages": "must not be empty" })),
            ));
        }

        let upstream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Aborted),
            result = self.provider.stream_theme(messages, self.max_steps) => result,
        };
        let mut upstream = upstream.map_err(|e| {
            error!(error = ?e, "Failed to start theme generation");
            ChatError::Provider(e.to_string())
        })?;

        let usage_repo = self.usage.clone();
        let model_id = self.provider.generation_model_id();
        let user_id = caller.user_id.clone();

        let stream: ResponseStream = Box::pin(async_stream::stream! {
            let mut total = TokenUsage::default();
            let mut finished = false;

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = upstream.next() => Some(item),
                };
                let Some(item) = next else {
                    info!("Theme generation aborted by caller");
                    return;
                };

                match item {
                    None => break,
                    Some(Ok(StreamChunk::Usage { input_tokens, output_tokens })) => {
                        total.add(TokenUsage::new(input_tokens, output_tokens));
                        yield Ok(StreamChunk::Usage { input_tokens, output_tokens });
                    }
                    Some(Ok(StreamChunk::Done)) => {
                        finished = true;
                        break;
                    }
                    Some(Ok(StreamChunk::Error { message })) => {
                        error!(error = %message, "Theme generation failed");
                        yield Ok(StreamChunk::Error { message: GENERATION_FAILED_MESSAGE.to_string() });
                        return;
                    }
                    Some(Ok(chunk)) => yield Ok(chunk),
                    Some(Err(e)) => {
                        error!(error = ?e, "Theme generation stream error");
                        yield Err(e);
                        return;
                    }
                }
            }

            if finished {
                if let Some(user_id) = user_id {
                    record_usage(usage_repo, UsageRecord::new(user_id, model_id, total));
                }
                yield Ok(StreamChunk::Done);
            }
        });

        Ok(stream)
    }

    /// Streams an enhanced prompt, re-chunked on word boundaries.
    pub async fn enhance_prompt(
        &self,
        prompt: AIPromptData,
        cancel: CancellationToken,
    ) -> ChatResult<TextStream> {
        if prompt.content.trim().is_empty() {
            return Err(ChatError::validation(
                "Invalid input",
                Some(serde_json::json!({ "promptData.content": "must not be empty" })),
            ));
        }

        let upstream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Aborted),
            result = self.provider.stream_enhancement(prompt.with_ready_images()) => result,
        };
        let mut upstream = upstream.map_err(|e| {
            error!(error = ?e, "Failed to start prompt enhancement");
            ChatError::Provider(e.to_string())
        })?;

        let stream: TextStream = Box::pin(async_stream::stream! {
            let mut buffer = String::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = upstream.next() => Some(item),
                };
                let Some(item) = next else {
                    debug!("Prompt enhancement aborted by caller");
                    return;
                };

                match item {
                    None => break,
                    Some(Ok(delta)) => {
                        buffer.push_str(&delta);
                        while let Some(word) = split_word(&mut buffer) {
                            yield Ok(word);
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = ?e, "Prompt enhancement stream error");
                        yield Err(e);
                        return;
                    }
                }
            }
            if !buffer.is_empty() {
                yield Ok(buffer);
            }
        });

        Ok(stream)
    }

    /// Request accounting for `caller`. Usage is unlimited; only the count
    /// is reported.
    pub async fn subscription_status(&self, caller: &Caller) -> ChatResult<SubscriptionStatus> {
        let user_id = caller.require_user()?;
        let used = self.usage.request_count(user_id).await?;
        Ok(SubscriptionStatus::unlimited(used))
    }
}

fn record_usage(repo: Arc<dyn UsageRepository>, record: UsageRecord) {
    tokio::spawn(async move {
        let user_id = record.user_id.clone();
        if let Err(e) = repo.record(record).await {
            error!(user_id = %user_id, error = ?e, "Failed to record AI usage");
        }
    });
}

/// Removes and returns the leading word plus one trailing whitespace
/// character, if a complete word is buffered.
fn split_word(buffer: &mut String) -> Option<String> {
    let start = buffer.len() - buffer.trim_start().len();
    let rel = buffer[start..].find(char::is_whitespace)?;
    let ws = buffer[start + rel..].chars().next()?;
    let end = start + rel + ws.len_utf8();
    Some(buffer.drain(..end).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryUsageRepository;
    use crate::services::testing::ScriptedProvider;

    fn service(provider: ScriptedProvider) -> (ThemeAiService, InMemoryUsageRepository) {
        let usage = InMemoryUsageRepository::new();
        let svc = ThemeAiService::new(
            Arc::new(provider),
            Arc::new(usage.clone()),
            &ChatConfig::default(),
        );
        (svc, usage)
    }

    async fn wait_for_records(usage: &InMemoryUsageRepository, n: usize) {
        for _ in 0..50 {
            if usage.records().len() >= n {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn split_word_preserves_text() {
        let mut buffer = String::from("  make it blue");
        let mut words = Vec::new();
        while let Some(w) = split_word(&mut buffer) {
            words.push(w);
        }
        assert_eq!(words, vec!["  make ", "it "]);
        assert_eq!(buffer, "blue");
    }

    #[tokio::test]
    async fn completed_generation_records_usage() {
        let provider = ScriptedProvider::new(vec![
            StreamChunk::Text { text: "ok".into() },
            StreamChunk::Usage { input_tokens: 10, output_tokens: 4 },
            StreamChunk::Usage { input_tokens: 5, output_tokens: 1 },
            StreamChunk::Done,
        ]);
        let (svc, usage) = service(provider);

        let stream = svc
            .generate_theme(&Caller::user("u1"), vec![ChatMessage::user_text("blue")], CancellationToken::new())
            .await
            .unwrap();
        let chunks: Vec<_> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(chunks.last(), Some(&StreamChunk::Done));
        wait_for_records(&usage, 1).await;
        let records = usage.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].prompt_tokens, 15);
        assert_eq!(records[0].completion_tokens, 5);
        assert_eq!(records[0].model_id, "scripted-model");
    }

    #[tokio::test]
    async fn cancelled_generation_ends_without_done_or_usage() {
        let provider = ScriptedProvider::new(vec![
            StreamChunk::Text { text: "partial".into() },
            StreamChunk::Usage { input_tokens: 10, output_tokens: 4 },
            StreamChunk::Done,
        ])
        .with_delay(std::time::Duration::from_millis(50));
        let (svc, usage) = service(provider);
        let cancel = CancellationToken::new();

        let mut stream = svc
            .generate_theme(&Caller::user("u1"), vec![ChatMessage::user_text("blue")], cancel.clone())
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, StreamChunk::Text { text: "partial".into() });

        cancel.cancel();
        let rest: Vec<_> = stream.collect().await;
        assert!(rest.is_empty());

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(usage.records().is_empty());
    }

    #[tokio::test]
    async fn provider_errors_are_not_leaked() {
        let provider = ScriptedProvider::new(vec![
            StreamChunk::Text { text: "Working".into() },
            StreamChunk::Error { message: "quota exceeded for key AIza...".into() },
            StreamChunk::Done,
        ]);
        let (svc, usage) = service(provider.clone());

        let chunks: Vec<_> = svc
            .generate_theme(&Caller::user("u1"), vec![ChatMessage::user_text("blue")], CancellationToken::new())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(
            chunks.last(),
            Some(&StreamChunk::Error { message: GENERATION_FAILED_MESSAGE.to_string() })
        );
        assert_eq!(provider.received()[0].1, 5);
        assert!(usage.records().is_empty());
    }

    #[tokio::test]
    async fn already_cancelled_request_is_aborted() {
        let (svc, _) = service(ScriptedProvider::new(vec![StreamChunk::Done]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = svc
            .generate_theme(&Caller::user("u1"), vec![ChatMessage::user_text("x")], cancel)
            .await;
        assert!(matches!(result, Err(ChatError::Aborted)));
    }

    #[tokio::test]
    async fn empty_messages_are_rejected() {
        let (svc, _) = service(ScriptedProvider::new(vec![]));
        let result = svc
            .generate_theme(&Caller::anonymous(), Vec::new(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ChatError::Validation { .. })));
    }

    #[tokio::test]
    async fn enhancement_is_rechunked_by_word() {
        let provider = ScriptedProvider::new(vec![])
            .with_enhancement(vec!["A vivid bl", "ue theme with", " soft corners"]);
        let (svc, _) = service(provider);

        let chunks: Vec<String> = svc
            .enhance_prompt(AIPromptData::text("blue"), CancellationToken::new())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks.concat(), "A vivid blue theme with soft corners");
        assert_eq!(chunks[0], "A ");
        assert_eq!(chunks.last().map(String::as_str), Some("corners"));
    }

    #[tokio::test]
    async fn subscription_reports_request_count() {
        let (svc, usage) = service(ScriptedProvider::new(vec![]));
        usage
            .record(UsageRecord::new("u1", "m", TokenUsage::new(1, 1)))
            .await
            .unwrap();

        let status = svc.subscription_status(&Caller::user("u1")).await.unwrap();
        assert_eq!(status.requests_used, 1);
        assert!(status.has_remaining());

        assert!(matches!(
            svc.subscription_status(&Caller::anonymous()).await,
            Err(ChatError::Unauthorized(_))
        ));
    }
}
