use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::draft_store::DraftStore;
use super::theme_stream::ERROR_TOAST_TITLE;
use super::transport::GenerationTransport;
use crate::error::{ChatError, normalize_transport_error};
use crate::models::{
    AIPromptData, EditorBuffer, EditorNode, MentionReference, StreamStatus, ToastStore,
    prompt_data_to_document,
};

const DEFAULT_ENHANCE_ERROR: &str = "Failed to enhance prompt. Please try again.";

#[derive(Default)]
struct EnhanceState {
    status: StreamStatus,
    completion: String,
    mentions: Vec<MentionReference>,
    cancel: Option<CancellationToken>,
    run_id: u64,
}

/// Rewrites the prompt in place while the enhancement streams in.
///
/// The editor shows the growing completion. The draft only receives the
/// final text, on finish or on stop.
pub struct PromptEnhancementStream {
    transport: Arc<dyn GenerationTransport>,
    draft: DraftStore,
    editor: Arc<EditorBuffer>,
    toasts: Arc<ToastStore>,
    state: Mutex<EnhanceState>,
}

impl PromptEnhancementStream {
    pub fn new(
        transport: Arc<dyn GenerationTransport>,
        draft: DraftStore,
        editor: Arc<EditorBuffer>,
        toasts: Arc<ToastStore>,
    ) -> Self {
        Self {
            transport,
            draft,
            editor,
            toasts,
            state: Mutex::new(EnhanceState::default()),
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.state.lock().status.clone()
    }

    pub fn is_enhancing(&self) -> bool {
        self.state.lock().status.is_streaming()
    }

    pub fn completion(&self) -> String {
        self.state.lock().completion.clone()
    }

    /// Streams an enhanced version of `prompt`. A blank prompt is ignored.
    /// Any run still in flight is dropped without persisting.
    pub async fn start_enhance(&self, prompt: AIPromptData) -> StreamStatus {
        if prompt.content.trim().is_empty() {
            debug!("Ignoring enhancement of blank prompt");
            return self.status();
        }

        let cancel = CancellationToken::new();
        let run_id = {
            let mut state = self.state.lock();
            if let Some(previous) = state.cancel.replace(cancel.clone()) {
                previous.cancel();
            }
            state.run_id += 1;
            state.completion.clear();
            state.mentions = prompt.mention_labels();
            state.status = StreamStatus::Streaming;
            state.run_id
        };

        let status = self.drive(run_id, prompt, &cancel).await;

        let mut state = self.state.lock();
        if state.run_id == run_id {
            state.cancel = None;
            state.status = status.clone();
        }
        status
    }

    /// Stops the run and keeps what arrived so far in the draft.
    pub fn stop_enhance(&self) {
        let document = {
            let mut state = self.state.lock();
            let Some(cancel) = state.cancel.take() else {
                return;
            };
            cancel.cancel();
            // Invalidate the run so its own completion is not written.
            state.run_id += 1;
            state.status = StreamStatus::Aborted;
            info!("Prompt enhancement stopped");

            if state.completion.trim().is_empty() {
                None
            } else {
                Some(completion_document(&state.completion, &state.mentions))
            }
        };

        if let Some(document) = document {
            self.draft.set_editor_content(Some(document));
        }
    }

    async fn drive(
        &self,
        run_id: u64,
        prompt: AIPromptData,
        cancel: &CancellationToken,
    ) -> StreamStatus {
        let mut stream = match self.transport.enhance_prompt(prompt, cancel.clone()).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(&e),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = stream.next() => Some(item),
            };
            let Some(item) = next else {
                return StreamStatus::Aborted;
            };

            match item {
                None => break,
                Some(Ok(delta)) => {
                    let document = {
                        let mut state = self.state.lock();
                        if state.run_id != run_id {
                            return StreamStatus::Aborted;
                        }
                        state.completion.push_str(&delta);
                        completion_document(&state.completion, &state.mentions)
                    };
                    self.editor.replace_if_changed(&document);
                }
                Some(Err(e)) => return self.fail(&ChatError::Transport(e.to_string())),
            }
        }

        let document = {
            let state = self.state.lock();
            if state.run_id != run_id {
                return StreamStatus::Aborted;
            }
            completion_document(&state.completion, &state.mentions)
        };
        self.editor.replace_if_changed(&document);
        self.draft.set_editor_content(Some(document));
        debug!("Prompt enhancement finished");
        StreamStatus::Completed
    }

    fn fail(&self, err: &ChatError) -> StreamStatus {
        if err.is_abort() {
            return StreamStatus::Aborted;
        }
        warn!(error = %err, "Prompt enhancement failed");
        let message = normalize_transport_error(err, DEFAULT_ENHANCE_ERROR);
        self.toasts.error(ERROR_TOAST_TITLE, Some(&message));
        StreamStatus::Error(message)
    }
}

fn completion_document(completion: &str, mentions: &[MentionReference]) -> EditorNode {
    prompt_data_to_document(&AIPromptData {
        content: completion.to_string(),
        mentions: mentions.to_vec(),
        images: Vec::new(),
    })
}
