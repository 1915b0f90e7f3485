use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::{AIPromptData, ChatMessage, TokenUsage};

/// Name of the single tool offered during theme generation.
pub const GENERATE_THEME_TOOL: &str = "generateTheme";

/// Stream chunks emitted during a theme generation. Serialized one per line
/// on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamChunk {
    Text {
        text: String,
    },
    ToolCallStarted {
        id: String,
        name: String,
    },
    ToolCallInput {
        id: String,
        arguments: serde_json::Value,
    },
    /// A finalized tool result.
    ToolCallResult {
        id: String,
        name: String,
        output: serde_json::Value,
    },
    ToolCallError {
        id: String,
        name: String,
        error: String,
    },
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
    Done,
    Error {
        message: String,
    },
}

impl StreamChunk {
    pub fn usage(usage: TokenUsage) -> Self {
        StreamChunk::Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

/// Type alias for response streams
pub type ResponseStream = BoxStream<'static, Result<StreamChunk>>;

/// Incremental completion text.
pub type TextStream = BoxStream<'static, Result<String>>;

/// The language model, seen as a black box that streams text and tool
/// calls.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Identifier recorded with usage.
    fn generation_model_id(&self) -> String;

    /// Streams a theme generation over `messages`, allowing at most
    /// `max_steps` sequential model steps.
    async fn stream_theme(&self, messages: Vec<ChatMessage>, max_steps: usize)
    -> Result<ResponseStream>;

    /// Streams an improved version of `prompt`.
    async fn stream_enhancement(&self, prompt: AIPromptData) -> Result<TextStream>;
}
