use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ChatConfig;
use crate::models::{
    AIPromptData, ChatStore, EditorBuffer, EditorNode, PromptImage, StreamStatus, ThemeState,
    ThemeStyles, ToastStore, document_to_prompt_data, preset_styles,
};
use crate::services::{
    DraftStore, GenerationTransport, Guards, ImageUploadCoordinator, ImageUploader,
    PostLoginActionKind, PostLoginQueue, PromptEnhancementStream, SessionClient,
    SessionSynchronizer, ThemeGenerationStream,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub should_clear_local_draft: bool,
}

/// A submitted prompt, as deferred across sign-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeGenerationPayload {
    pub prompt_data: AIPromptData,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Nothing to send.
    Ignored,
    /// Queued until the user signs in.
    AwaitingLogin,
    /// No usable subscription.
    Blocked,
    Finished(StreamStatus),
}

/// Wires the chat pipeline together: draft, uploads, enhancement,
/// generation and session sync behind the actions of the chat form.
pub struct ChatController {
    pub chat: Arc<ChatStore>,
    pub theme: ThemeState,
    pub toasts: Arc<ToastStore>,
    pub editor: Arc<EditorBuffer>,
    pub draft: DraftStore,
    pub uploads: ImageUploadCoordinator,
    pub generation: Arc<ThemeGenerationStream>,
    pub enhancement: Arc<PromptEnhancementStream>,
    pub sessions: Arc<SessionSynchronizer>,
    pub guards: Arc<Guards>,
    pub post_login: Arc<PostLoginQueue>,
    default_theme: ThemeStyles,
    presets: Mutex<HashMap<String, ThemeStyles>>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl ChatController {
    pub fn new(
        transport: Arc<dyn GenerationTransport>,
        session_client: Arc<dyn SessionClient>,
        uploader: Arc<dyn ImageUploader>,
        draft: DraftStore,
        config: &ChatConfig,
        user_id: Option<String>,
    ) -> Arc<Self> {
        let chat = Arc::new(ChatStore::new());
        let theme = ThemeState::default();
        let toasts = Arc::new(ToastStore::default());
        let editor = Arc::new(EditorBuffer::default());
        let post_login = Arc::new(PostLoginQueue::new());

        let uploads = ImageUploadCoordinator::new(uploader, draft.clone(), toasts.clone(), config);
        let generation = Arc::new(ThemeGenerationStream::new(
            transport.clone(),
            chat.clone(),
            theme.clone(),
            toasts.clone(),
        ));
        let enhancement = Arc::new(PromptEnhancementStream::new(
            transport.clone(),
            draft.clone(),
            editor.clone(),
            toasts.clone(),
        ));
        let sessions = Arc::new(SessionSynchronizer::new(
            session_client,
            chat.clone(),
            generation.clone(),
            toasts.clone(),
        ));
        let guards = Arc::new(Guards::new(transport, post_login.clone(), user_id));

        Arc::new_cyclic(|weak: &Weak<ChatController>| {
            let weak = weak.clone();
            post_login.register(
                PostLoginActionKind::AiGenerateFromChat,
                Arc::new(move |payload| -> BoxFuture<'static, anyhow::Result<()>> {
                    let weak = weak.clone();
                    Box::pin(async move {
                        let Some(controller) = weak.upgrade() else {
                            return Ok(());
                        };
                        let payload: ThemeGenerationPayload = serde_json::from_value(payload)?;
                        controller.generate_theme(payload).await;
                        Ok(())
                    })
                }),
            );

            Self {
                default_theme: theme.snapshot(),
                chat,
                theme,
                toasts,
                editor,
                draft,
                uploads,
                generation,
                enhancement,
                sessions,
                guards,
                post_login,
                presets: Mutex::new(HashMap::new()),
                observer: Mutex::new(None),
            }
        })
    }

    /// Restores the draft, loads sessions and starts syncing.
    pub async fn start(&self) {
        self.uploads.initialize_from_draft();
        if let Some(content) = self.draft.editor_content() {
            self.editor.replace_if_changed(&content);
        }

        if self.guards.user_id().is_some() {
            self.guards.refresh_subscription().await;
            self.sessions.invalidate_sessions().await;
        }

        let mut observer = self.observer.lock();
        if observer.is_none() {
            *observer = Some(self.sessions.spawn_observer());
        }
    }

    pub fn register_preset(&self, id: impl Into<String>, preset: ThemeStyles) {
        self.presets.lock().insert(id.into(), preset);
    }

    /// Replaces the active theme with a registered preset.
    pub fn apply_preset(&self, id: &str) -> bool {
        let Some(preset) = self.presets.lock().get(id).cloned() else {
            return false;
        };
        self.theme.reset_to(preset_styles(&self.default_theme, &preset));
        true
    }

    /// Prompt currently in the editor draft. Mentions resolve to preset
    /// styles.
    pub fn prompt_data(&self) -> AIPromptData {
        let doc = self.draft.editor_content().unwrap_or_else(EditorNode::empty_doc);
        let presets = self.presets.lock();
        document_to_prompt_data(&doc, |id| {
            presets
                .get(id)
                .map(|preset| preset_styles(&self.default_theme, preset))
        })
    }

    pub fn set_editor_content(&self, content: EditorNode) {
        self.draft.set_editor_content(Some(content));
    }

    pub fn is_empty_prompt(&self) -> bool {
        self.uploads.images().is_empty() && self.prompt_data().content.trim().is_empty()
    }

    pub fn can_submit(&self) -> bool {
        !self.generation.is_streaming()
            && !self.enhancement.is_enhancing()
            && !self.is_empty_prompt()
            && !self.uploads.is_some_uploading()
    }

    fn ready_images(&self) -> Vec<PromptImage> {
        self.uploads
            .prompt_images()
            .into_iter()
            .filter(|img| !img.loading)
            .collect()
    }

    pub async fn handle_generate_submit(&self) -> SubmitOutcome {
        let images = self.ready_images();
        let prompt = self.prompt_data();
        if prompt.content.trim().is_empty() && images.is_empty() {
            return SubmitOutcome::Ignored;
        }

        let payload = ThemeGenerationPayload {
            prompt_data: AIPromptData { images, ..prompt },
            options: GenerationOptions {
                should_clear_local_draft: true,
            },
        };

        let deferred = serde_json::to_value(&payload)
            .ok()
            .map(|value| (PostLoginActionKind::AiGenerateFromChat, value));
        if !self.guards.check_valid_session(deferred) {
            return SubmitOutcome::AwaitingLogin;
        }
        if !self.guards.check_valid_subscription() {
            return SubmitOutcome::Blocked;
        }

        SubmitOutcome::Finished(self.generate_theme(payload).await)
    }

    pub async fn generate_theme(&self, payload: ThemeGenerationPayload) -> StreamStatus {
        if payload.options.should_clear_local_draft {
            self.draft.clear();
            self.uploads.clear();
            self.editor.replace_if_changed(&EditorNode::empty_doc());
        }
        self.generation.generate(&payload.prompt_data).await
    }

    pub async fn handle_enhance(&self) -> SubmitOutcome {
        if !self.guards.check_valid_session(None) {
            return SubmitOutcome::AwaitingLogin;
        }
        if !self.guards.check_valid_subscription() {
            return SubmitOutcome::Blocked;
        }

        let prompt = AIPromptData {
            images: self.ready_images(),
            ..self.prompt_data()
        };
        SubmitOutcome::Finished(self.enhancement.start_enhance(prompt).await)
    }

    pub fn stop_generation(&self) {
        self.generation.stop();
    }

    pub fn stop_enhance(&self) {
        self.enhancement.stop_enhance();
    }

    pub async fn handle_new_chat(&self) {
        self.sessions.start_new_chat().await;
        self.draft.clear();
        self.uploads.clear();
        self.editor.replace_if_changed(&EditorNode::empty_doc());
    }

    /// Deletes the open chat. Returns false when no chat is open.
    pub async fn handle_delete_chat(&self) -> bool {
        if !self.guards.check_valid_session(None) {
            return false;
        }
        let Some(id) = self.sessions.current_session_id() else {
            self.toasts.error("No active chat", Some("There is no active chat to delete."));
            return false;
        };
        self.sessions.delete_session(&id).await
    }

    pub async fn handle_rename_chat(&self, title: &str) -> bool {
        if !self.guards.check_valid_session(None) {
            return false;
        }
        let Some(id) = self.sessions.current_session_id() else {
            self.toasts.error("No active chat", Some("There is no active chat to rename."));
            return false;
        };
        self.sessions.rename_session(&id, title).await
    }

    /// Sign-in completed: refresh state, then run the deferred action.
    pub async fn on_login(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        info!(user_id = %user_id, "User signed in");
        self.guards.set_user(Some(user_id));
        self.guards.refresh_subscription().await;
        self.sessions.invalidate_sessions().await;

        if !self.post_login.on_authenticated().await {
            debug!("No post-login action pending");
        }
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.lock().take() {
            observer.abort();
        }
    }
}
