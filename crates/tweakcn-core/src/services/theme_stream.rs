use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model_provider::{GENERATE_THEME_TOOL, StreamChunk};
use super::transport::GenerationTransport;
use crate::error::{ChatError, normalize_transport_error};
use crate::models::{
    AIPromptData, ChatMessage, ChatStore, MessagePart, MessageRole, StreamStatus, ThemeState,
    ThemeStyles, ToastStore, build_user_content_parts,
};

pub const ERROR_TOAST_TITLE: &str = "An error occurred";
const DEFAULT_GENERATION_ERROR: &str = "Failed to generate theme. Please try again.";

struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
}

enum ChunkOutcome {
    Continue,
    Done,
    Failed(String),
}

/// Drives theme generations for the open chat.
///
/// Single flight: starting a run cancels the previous one. Finalized
/// `generateTheme` results are validated, attached to their message and
/// merged into the live theme as they arrive.
pub struct ThemeGenerationStream {
    transport: Arc<dyn GenerationTransport>,
    chat: Arc<ChatStore>,
    theme: ThemeState,
    toasts: Arc<ToastStore>,
    active: Mutex<Option<ActiveRun>>,
    run_seq: AtomicU64,
}

impl ThemeGenerationStream {
    pub fn new(
        transport: Arc<dyn GenerationTransport>,
        chat: Arc<ChatStore>,
        theme: ThemeState,
        toasts: Arc<ToastStore>,
    ) -> Self {
        Self {
            transport,
            chat,
            theme,
            toasts,
            active: Mutex::new(None),
            run_seq: AtomicU64::new(0),
        }
    }

    /// Appends `prompt` as a user message and generates a reply. Resolves
    /// with the run's final status.
    pub async fn generate(&self, prompt: &AIPromptData) -> StreamStatus {
        let parts = build_user_content_parts(prompt);
        if parts.is_empty() {
            debug!("Ignoring empty prompt");
            return self.chat.status();
        }

        // Streaming before the prompt lands, so observers never see it settled.
        let (run_id, cancel) = self.begin();
        self.chat.set_status(StreamStatus::Streaming);
        self.chat.push(ChatMessage::new(MessageRole::User, parts));
        self.run(run_id, cancel).await
    }

    /// Cancels the in-flight run, if any. Partial output and applied styles
    /// stay.
    pub fn stop(&self) {
        if let Some(run) = self.active.lock().as_ref() {
            info!(run = run.id, "Stopping theme generation");
            run.cancel.cancel();
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active.lock().is_some()
    }

    async fn run(&self, run_id: u64, cancel: CancellationToken) -> StreamStatus {
        let messages = self.chat.messages();
        let status = self.drive(messages, &cancel).await;

        self.finish(run_id, &status);
        status
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let id = self.run_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let previous = self.active.lock().replace(ActiveRun {
            id,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            debug!(run = previous.id, "Superseding previous theme generation");
            previous.cancel.cancel();
        }
        (id, cancel)
    }

    /// Publishes the final status unless a newer run took over.
    fn finish(&self, run_id: u64, status: &StreamStatus) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|run| run.id == run_id) {
            *active = None;
            drop(active);
            self.chat.set_status(status.clone());
        }
    }

    async fn drive(&self, messages: Vec<ChatMessage>, cancel: &CancellationToken) -> StreamStatus {
        let mut stream = match self.transport.generate_theme(messages, cancel.clone()).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(&e),
        };

        let mut assistant_id: Option<String> = None;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = stream.next() => Some(item),
            };
            let Some(item) = next else {
                info!("Theme generation aborted");
                return StreamStatus::Aborted;
            };

            match item {
                None => return StreamStatus::Completed,
                Some(Ok(chunk)) => match self.apply_chunk(&mut assistant_id, chunk) {
                    ChunkOutcome::Continue => {}
                    ChunkOutcome::Done => return StreamStatus::Completed,
                    ChunkOutcome::Failed(message) => return self.report(message),
                },
                Some(Err(e)) => return self.fail(&ChatError::Transport(e.to_string())),
            }
        }
    }

    fn apply_chunk(&self, assistant_id: &mut Option<String>, chunk: StreamChunk) -> ChunkOutcome {
        match chunk {
            StreamChunk::Text { text } => {
                self.with_assistant(assistant_id, |m| m.push_text(&text));
            }
            StreamChunk::ToolCallStarted { id, name } => {
                debug!(tool = %name, call_id = %id, "Tool call started");
                self.with_assistant(assistant_id, |m| {
                    m.parts.push(MessagePart::ToolCall {
                        id,
                        name,
                        arguments: serde_json::Value::Null,
                    })
                });
            }
            StreamChunk::ToolCallInput { id, arguments } => {
                self.with_assistant(assistant_id, |m| {
                    for part in m.parts.iter_mut() {
                        if let MessagePart::ToolCall { id: call_id, arguments: args, .. } = part {
                            if *call_id == id {
                                *args = arguments.clone();
                            }
                        }
                    }
                });
            }
            StreamChunk::ToolCallResult { id, name, output } => {
                let styles = if name == GENERATE_THEME_TOOL {
                    match ThemeStyles::from_tool_output(&output) {
                        Ok(styles) => Some(styles),
                        Err(e) => {
                            warn!(call_id = %id, error = %e, "Ignoring invalid generateTheme result");
                            None
                        }
                    }
                } else {
                    None
                };

                self.with_assistant(assistant_id, |m| {
                    m.parts.push(MessagePart::ToolResult { id, name, output });
                    if let Some(styles) = &styles {
                        m.set_theme_styles(styles.clone());
                    }
                });
                if let Some(styles) = styles {
                    self.theme.apply(&styles);
                }
            }
            StreamChunk::ToolCallError { id, name, error } => {
                warn!(tool = %name, call_id = %id, error = %error, "Tool call failed");
                self.with_assistant(assistant_id, |m| {
                    m.parts.push(MessagePart::ToolResult {
                        id,
                        name,
                        output: serde_json::json!({ "error": error }),
                    })
                });
            }
            StreamChunk::Usage {
                input_tokens,
                output_tokens,
            } => {
                debug!(input_tokens, output_tokens, "Generation step usage");
            }
            StreamChunk::Done => return ChunkOutcome::Done,
            StreamChunk::Error { message } => return ChunkOutcome::Failed(message),
        }
        ChunkOutcome::Continue
    }

    /// Runs `f` on this run's assistant message, creating it on first use.
    fn with_assistant<F>(&self, assistant_id: &mut Option<String>, f: F)
    where
        F: FnOnce(&mut ChatMessage),
    {
        let id = match assistant_id {
            Some(id) => id.clone(),
            None => {
                let message = ChatMessage::assistant();
                let id = message.id.clone();
                self.chat.push(message);
                *assistant_id = Some(id.clone());
                id
            }
        };
        if !self.chat.update_message(&id, f) {
            debug!(message_id = %id, "Assistant message no longer in chat");
        }
    }

    fn fail(&self, err: &ChatError) -> StreamStatus {
        if err.is_abort() {
            return StreamStatus::Aborted;
        }
        warn!(error = %err, "Theme generation failed");
        self.report(normalize_transport_error(err, DEFAULT_GENERATION_ERROR))
    }

    fn report(&self, message: String) -> StreamStatus {
        let message = if message.trim().is_empty() {
            DEFAULT_GENERATION_ERROR.to_string()
        } else {
            message
        };
        self.toasts.error(ERROR_TOAST_TITLE, Some(&message));
        StreamStatus::Error(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use crate::repositories::InMemoryUsageRepository;
    use crate::services::ai_service::ThemeAiService;
    use crate::services::auth::Caller;
    use crate::services::testing::ScriptedProvider;
    use crate::services::transport::LocalTransport;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        stream: Arc<ThemeGenerationStream>,
        chat: Arc<ChatStore>,
        theme: ThemeState,
        toasts: Arc<ToastStore>,
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        let service = Arc::new(ThemeAiService::new(
            Arc::new(provider),
            Arc::new(InMemoryUsageRepository::new()),
            &ChatConfig::default(),
        ));
        let transport = Arc::new(LocalTransport::new(service, Caller::user("u1")));
        let chat = Arc::new(ChatStore::new());
        let theme = ThemeState::default();
        let toasts = Arc::new(ToastStore::default());
        let stream = Arc::new(ThemeGenerationStream::new(
            transport,
            chat.clone(),
            theme.clone(),
            toasts.clone(),
        ));
        Harness { stream, chat, theme, toasts }
    }

    fn theme_result(id: &str, light: serde_json::Value) -> StreamChunk {
        StreamChunk::ToolCallResult {
            id: id.into(),
            name: GENERATE_THEME_TOOL.into(),
            output: json!({ "light": light }),
        }
    }

    #[tokio::test]
    async fn tool_results_attach_metadata_and_apply_styles() {
        let h = harness(ScriptedProvider::new(vec![
            StreamChunk::Text { text: "Making it blue. ".into() },
            StreamChunk::ToolCallStarted { id: "c1".into(), name: GENERATE_THEME_TOOL.into() },
            StreamChunk::ToolCallInput { id: "c1".into(), arguments: json!({ "light": { "primary": "blue" } }) },
            theme_result("c1", json!({ "primary": "blue" })),
            StreamChunk::ToolCallResult { id: "c2".into(), name: "otherTool".into(), output: json!({ "light": { "accent": "red" } }) },
            StreamChunk::Done,
        ]));

        let status = h.stream.generate(&AIPromptData::text("make it blue")).await;

        assert_eq!(status, StreamStatus::Completed);
        assert_eq!(h.chat.status(), StreamStatus::Completed);
        let messages = h.chat.messages();
        assert_eq!(messages.len(), 2);
        let assistant = &messages[1];
        assert_eq!(assistant.theme_styles().unwrap().light["primary"], "blue");
        assert!(matches!(
            &assistant.parts[1],
            MessagePart::ToolCall { arguments, .. } if arguments["light"]["primary"] == "blue"
        ));
        let theme = h.theme.snapshot();
        assert_eq!(theme.light["primary"], "blue");
        assert!(!theme.light.contains_key("accent"));
    }

    #[tokio::test]
    async fn invalid_results_are_skipped_without_failing() {
        let h = harness(ScriptedProvider::new(vec![
            StreamChunk::ToolCallResult { id: "c1".into(), name: GENERATE_THEME_TOOL.into(), output: json!("not a theme") },
            theme_result("c2", json!({ "primary": "green" })),
            StreamChunk::Done,
        ]));

        assert_eq!(h.stream.generate(&AIPromptData::text("green")).await, StreamStatus::Completed);
        assert_eq!(h.theme.snapshot().light["primary"], "green");
        assert!(h.toasts.errors().is_empty());
    }

    #[tokio::test]
    async fn abort_keeps_applied_results_and_skips_later_ones() {
        let h = harness(
            ScriptedProvider::new(vec![
                theme_result("c1", json!({ "primary": "blue" })),
                theme_result("c2", json!({ "accent": "cyan" })),
                theme_result("c3", json!({ "primary": "red" })),
                StreamChunk::Done,
            ])
            .with_delay(Duration::from_millis(40)),
        );
        let mut theme_rx = h.theme.subscribe();

        let stream = h.stream.clone();
        let run = tokio::spawn(async move { stream.generate(&AIPromptData::text("blue")).await });

        // Two results in, then abort.
        theme_rx.changed().await.unwrap();
        theme_rx.changed().await.unwrap();
        h.stream.stop();
        let status = run.await.unwrap();

        assert_eq!(status, StreamStatus::Aborted);
        assert_eq!(h.chat.status(), StreamStatus::Aborted);
        let theme = h.theme.snapshot();
        assert_eq!(theme.light["primary"], "blue");
        assert_eq!(theme.light["accent"], "cyan");

        let assistant = &h.chat.messages()[1];
        assert_eq!(assistant.parts.len(), 2);
        assert!(h.toasts.errors().is_empty());
    }

    #[tokio::test]
    async fn provider_error_raises_one_toast_and_keeps_styles() {
        let h = harness(ScriptedProvider::new(vec![
            theme_result("c1", json!({ "primary": "blue" })),
            StreamChunk::Error { message: "boom".into() },
        ]));

        let status = h.stream.generate(&AIPromptData::text("blue")).await;

        assert!(matches!(status, StreamStatus::Error(_)));
        assert_eq!(h.toasts.errors().len(), 1);
        assert_eq!(h.toasts.errors()[0].title, ERROR_TOAST_TITLE);
        assert_eq!(h.theme.snapshot().light["primary"], "blue");
    }

    #[tokio::test]
    async fn start_failure_is_normalized() {
        let h = harness(ScriptedProvider::failing("connect ECONNREFUSED"));

        let status = h.stream.generate(&AIPromptData::text("blue")).await;

        assert_eq!(status, StreamStatus::Error(DEFAULT_GENERATION_ERROR.to_string()));
        assert_eq!(h.toasts.errors().len(), 1);
    }

    #[tokio::test]
    async fn second_run_supersedes_first() {
        let h = harness(
            ScriptedProvider::new(vec![
                StreamChunk::Text { text: "slow".into() },
                StreamChunk::Done,
            ])
            .with_delay(Duration::from_millis(50)),
        );

        let first = {
            let stream = h.stream.clone();
            tokio::spawn(async move { stream.generate(&AIPromptData::text("one")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = h.stream.generate(&AIPromptData::text("two")).await;

        assert_eq!(first.await.unwrap(), StreamStatus::Aborted);
        assert_eq!(second, StreamStatus::Completed);
        assert_eq!(h.chat.status(), StreamStatus::Completed);
        assert!(!h.stream.is_streaming());
    }

    #[tokio::test]
    async fn empty_prompt_is_ignored() {
        let h = harness(ScriptedProvider::new(vec![StreamChunk::Done]));
        assert_eq!(h.stream.generate(&AIPromptData::text("  ")).await, StreamStatus::Idle);
        assert!(h.chat.messages().is_empty());
    }
}
