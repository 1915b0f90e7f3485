//! In-process fakes for tests and local demos.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::model_provider::{ModelProvider, ResponseStream, StreamChunk, TextStream};
use crate::models::{AIPromptData, ChatMessage};

/// Replays a fixed script of chunks for every request.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    chunks: Vec<StreamChunk>,
    enhancement: Vec<String>,
    delay: Option<Duration>,
    start_error: Option<String>,
    received: Arc<Mutex<Vec<(Vec<ChatMessage>, usize)>>>,
}

impl ScriptedProvider {
    pub fn new(chunks: Vec<StreamChunk>) -> Self {
        Self {
            chunks,
            ..Default::default()
        }
    }

    /// Sleeps before each chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_enhancement(mut self, deltas: Vec<&str>) -> Self {
        self.enhancement = deltas.into_iter().map(str::to_string).collect();
        self
    }

    /// Fails every request before streaming starts.
    pub fn failing(message: &str) -> Self {
        Self {
            start_error: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Messages and step limits of every generation request so far.
    pub fn received(&self) -> Vec<(Vec<ChatMessage>, usize)> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn generation_model_id(&self) -> String {
        "scripted-model".to_string()
    }

    async fn stream_theme(&self, messages: Vec<ChatMessage>, max_steps: usize) -> Result<ResponseStream> {
        self.received.lock().push((messages, max_steps));
        if let Some(message) = &self.start_error {
            return Err(anyhow!(message.clone()));
        }

        let chunks = self.chunks.clone();
        let delay = self.delay;
        Ok(Box::pin(async_stream::stream! {
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(chunk);
            }
        }))
    }

    async fn stream_enhancement(&self, _prompt: AIPromptData) -> Result<TextStream> {
        if let Some(message) = &self.start_error {
            return Err(anyhow!(message.clone()));
        }

        let deltas = self.enhancement.clone();
        let delay = self.delay;
        Ok(Box::pin(async_stream::stream! {
            for delta in deltas {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(delta);
            }
        }))
    }
}
