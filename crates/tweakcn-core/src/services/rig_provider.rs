use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use rig::OneOrMany;
use rig::client::CompletionClient;
use rig::completion::Message;
use rig::completion::message::{AssistantContent, ImageDetail, ImageMediaType, Text, UserContent};
use rig::streaming::StreamingPrompt;
use tracing::{debug, warn};

use super::generate_theme_tool::GenerateThemeTool;
use super::model_provider::{ModelProvider, ResponseStream, StreamChunk, TextStream};
use crate::config::ChatConfig;
use crate::models::{
    AIPromptData, ChatMessage, MessagePart, MessageRole, build_user_content_parts,
};

const GENERATE_THEME_SYSTEM: &str = "You are a theme designer for shadcn/ui. \
    Turn the user's request into concrete CSS token values and apply them by calling \
    the generateTheme tool. Change only what the request asks for. After the tool call, \
    describe the result in one or two sentences.";

const ENHANCE_PROMPT_SYSTEM: &str = "Rewrite the user's theme request into a clearer, \
    more specific prompt for a theme generator. Keep every @mention exactly as written. \
    Reply with the rewritten prompt only.";

/// Gemini-backed provider built on rig agents.
pub struct GeminiThemeProvider {
    client: rig::providers::gemini::Client,
    generation_model: String,
    enhancement_model: String,
}

impl GeminiThemeProvider {
    /// Reads the API key from the env var named by `config.api_key_env`.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} is not set", config.api_key_env))?;

        let client = rig::providers::gemini::Client::new(&key)?;

        Ok(Self {
            client,
            generation_model: config.generation_model.clone(),
            enhancement_model: config.enhancement_model.clone(),
        })
    }
}

/// Helper macro to turn a rig multi-turn stream into stream chunks.
/// Tool results are attributed to the tool name seen on the matching call.
macro_rules! process_theme_stream {
    ($stream:expr) => {
        Box::pin(async_stream::stream! {
            let mut tool_names: HashMap<String, String> = HashMap::new();
            while let Some(item) = $stream.next().await {
                match item {
                    Ok(rig::agent::MultiTurnStreamItem::StreamAssistantItem(content)) => {
                        match content {
                            rig::streaming::StreamedAssistantContent::Text(text) => {
                                yield Ok(StreamChunk::Text { text: text.text });
                            }
                            rig::streaming::StreamedAssistantContent::ToolCall { tool_call, .. } => {
                                let tool_id = tool_call.call_id.clone()
                                    .unwrap_or_else(|| tool_call.id.clone());
                                tool_names.insert(tool_id.clone(), tool_call.function.name.clone());
                                yield Ok(StreamChunk::ToolCallStarted {
                                    id: tool_id.clone(),
                                    name: tool_call.function.name.clone(),
                                });
                                yield Ok(StreamChunk::ToolCallInput {
                                    id: tool_id,
                                    arguments: tool_call.function.arguments.clone(),
                                });
                            }
                            _ => {}
                        }
                    }
                    Ok(rig::agent::MultiTurnStreamItem::StreamUserItem(user_content)) => {
                        use rig::streaming::StreamedUserContent;
                        use rig::completion::message::ToolResultContent;

                        let StreamedUserContent::ToolResult { tool_result, .. } = user_content;
                        let content_text = tool_result.content.iter()
                            .filter_map(|c| match c {
                                ToolResultContent::Text(text) => Some(text.text.clone()),
                                ToolResultContent::Image(_) => None,
                            })
                            .collect::<Vec<_>>()
                            .join("\n");

                        let call_id = tool_result.call_id.clone()
                            .unwrap_or_else(|| tool_result.id.clone());
                        let name = tool_names.get(&call_id).cloned().unwrap_or_default();

                        match serde_json::from_str::<serde_json::Value>(&content_text) {
                            Ok(output) => yield Ok(StreamChunk::ToolCallResult { id: call_id, name, output }),
                            Err(_) => {
                                debug!(tool = %name, "Tool returned non-JSON output");
                                yield Ok(StreamChunk::ToolCallError { id: call_id, name, error: content_text });
                            }
                        }
                    }
                    Ok(rig::agent::MultiTurnStreamItem::FinalResponse(response)) => {
                        let usage = response.usage();
                        yield Ok(StreamChunk::Usage {
                            input_tokens: usage.input_tokens,
                            output_tokens: usage.output_tokens,
                        });
                    }
                    Err(e) => {
                        yield Ok(StreamChunk::Error { message: e.to_string() });
                        return;
                    }
                    _ => {}
                }
            }
            yield Ok(StreamChunk::Done);
        })
    };
}

#[async_trait]
impl ModelProvider for GeminiThemeProvider {
    fn generation_model_id(&self) -> String {
        self.generation_model.clone()
    }

    async fn stream_theme(&self, messages: Vec<ChatMessage>, max_steps: usize) -> Result<ResponseStream> {
        let (prompt, history) = split_prompt(&messages)?;

        let agent = self
            .client
            .agent(&self.generation_model)
            .preamble(GENERATE_THEME_SYSTEM)
            .tool(GenerateThemeTool)
            .build();

        let mut stream = agent
            .stream_prompt(prompt)
            .with_history(history)
            .multi_turn(max_steps)
            .await;

        let stream: ResponseStream = process_theme_stream!(stream);
        Ok(stream)
    }

    async fn stream_enhancement(&self, prompt: AIPromptData) -> Result<TextStream> {
        let contents = to_user_contents(&build_user_content_parts(&prompt));
        let user_message = Message::User {
            content: OneOrMany::many(contents).context("Prompt has no content")?,
        };

        let agent = self
            .client
            .agent(&self.enhancement_model)
            .preamble(ENHANCE_PROMPT_SYSTEM)
            .build();

        let mut stream = agent
            .stream_prompt(user_message)
            .with_history(Vec::<Message>::new())
            .multi_turn(1)
            .await;

        let text: TextStream = Box::pin(async_stream::stream! {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(rig::agent::MultiTurnStreamItem::StreamAssistantItem(
                        rig::streaming::StreamedAssistantContent::Text(text),
                    )) => yield Ok(text.text),
                    Err(e) => {
                        yield Err(anyhow!(e.to_string()));
                        return;
                    }
                    _ => {}
                }
            }
        });
        Ok(text)
    }
}

/// Splits chat messages into the latest user prompt and the prior history.
fn split_prompt(messages: &[ChatMessage]) -> Result<(Message, Vec<Message>)> {
    let last_user = messages
        .iter()
        .rposition(|m| m.role == MessageRole::User)
        .ok_or_else(|| anyhow!("No user message to respond to"))?;

    let history = messages[..last_user]
        .iter()
        .filter_map(to_rig_message)
        .collect();
    let prompt = to_rig_message(&messages[last_user])
        .ok_or_else(|| anyhow!("User message has no sendable content"))?;

    Ok((prompt, history))
}

fn to_rig_message(message: &ChatMessage) -> Option<Message> {
    match message.role {
        MessageRole::User => {
            let contents = to_user_contents(&message.parts);
            OneOrMany::many(contents)
                .ok()
                .map(|content| Message::User { content })
        }
        MessageRole::Assistant => {
            let text = assistant_transcript(message);
            if text.is_empty() {
                return None;
            }
            Some(Message::Assistant {
                id: None,
                content: OneOrMany::one(AssistantContent::Text(Text { text })),
            })
        }
        // The system prompt is the agent preamble.
        MessageRole::System => None,
    }
}

/// Assistant text plus a compact record of applied themes, so follow-up
/// requests see what is currently on screen.
fn assistant_transcript(message: &ChatMessage) -> String {
    let mut out = message.text();
    for part in &message.parts {
        if let MessagePart::ToolResult { name, output, .. } = part {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{name} result] {output}"));
        }
    }
    out
}

fn to_user_contents(parts: &[MessagePart]) -> Vec<UserContent> {
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } => Some(UserContent::Text(Text { text: text.clone() })),
            MessagePart::Image { url } => Some(image_content(url)),
            MessagePart::ToolCall { .. } | MessagePart::ToolResult { .. } => None,
        })
        .collect()
}

fn image_content(url: &str) -> UserContent {
    match parse_data_url(url) {
        Some((mime, data)) => UserContent::image_base64(
            data,
            media_type(mime),
            Some(ImageDetail::Auto),
        ),
        None => UserContent::image_url(url, None, Some(ImageDetail::Auto)),
    }
}

/// `data:<mime>;base64,<payload>` to `(mime, payload)`.
fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, data))
}

fn media_type(mime: &str) -> Option<ImageMediaType> {
    match mime {
        "image/png" => Some(ImageMediaType::PNG),
        "image/jpeg" | "image/jpg" => Some(ImageMediaType::JPEG),
        "image/gif" => Some(ImageMediaType::GIF),
        "image/webp" => Some(ImageMediaType::WEBP),
        "image/svg+xml" => Some(ImageMediaType::SVG),
        other => {
            warn!(mime = %other, "Unknown image media type");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_urls_are_split() {
        assert_eq!(
            parse_data_url("data:image/png;base64,AAAA"),
            Some(("image/png", "AAAA"))
        );
        assert_eq!(parse_data_url("https://cdn/x.png"), None);
        assert_eq!(parse_data_url("data:text/plain,hello"), None);
    }

    #[test]
    fn prompt_is_last_user_message() {
        let mut assistant = ChatMessage::assistant();
        assistant.push_text("Here you go");
        let messages = vec![
            ChatMessage::user_text("make it blue"),
            assistant,
            ChatMessage::user_text("now darker"),
        ];

        let (prompt, history) = split_prompt(&messages).unwrap();
        assert_eq!(history.len(), 2);
        assert!(matches!(prompt, Message::User { .. }));
    }

    #[test]
    fn split_requires_a_user_message() {
        assert!(split_prompt(&[ChatMessage::assistant()]).is_err());
    }

    #[test]
    fn transcript_includes_tool_results() {
        let mut msg = ChatMessage::assistant();
        msg.push_text("Applied.");
        msg.parts.push(MessagePart::ToolResult {
            id: "c".into(),
            name: "generateTheme".into(),
            output: serde_json::json!({ "light": { "primary": "blue" } }),
        });

        let text = assistant_transcript(&msg);
        assert!(text.starts_with("Applied.\n[generateTheme result]"));
    }
}
