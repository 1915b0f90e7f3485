#[cfg(test)]
mod tests {
    use super::super::chat_controller::{ChatController, SubmitOutcome};
    use crate::config::ChatConfig;
    use crate::models::{
        AIPromptData, EditorNode, MessagePart, MessageRole, StreamStatus, ThemeStyles,
        prompt_data_to_document,
    };
    use crate::models::prompt::MentionAttrs;
    use crate::repositories::{
        DraftSnapshot, InMemoryDraftRepository, InMemorySessionRepository, InMemoryUsageRepository,
    };
    use crate::services::ai_service::ThemeAiService;
    use crate::services::auth::Caller;
    use crate::services::image_upload::{DataUrlUploader, ImageFile};
    use crate::services::model_provider::{GENERATE_THEME_TOOL, StreamChunk};
    use crate::services::session_client::LocalSessionClient;
    use crate::services::session_service::SessionService;
    use crate::services::testing::ScriptedProvider;
    use crate::services::transport::LocalTransport;
    use crate::services::DraftStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct App {
        controller: Arc<ChatController>,
        provider: ScriptedProvider,
        sessions: Arc<SessionService>,
        usage: InMemoryUsageRepository,
    }

    fn blue_script() -> Vec<StreamChunk> {
        vec![
            StreamChunk::Text { text: "Making it blue.".into() },
            StreamChunk::ToolCallStarted { id: "call-1".into(), name: GENERATE_THEME_TOOL.into() },
            StreamChunk::ToolCallInput {
                id: "call-1".into(),
                arguments: json!({ "light": { "primary": "blue" } }),
            },
            StreamChunk::ToolCallResult {
                id: "call-1".into(),
                name: GENERATE_THEME_TOOL.into(),
                output: json!({
                    "light": { "primary": "oklch(0.55 0.2 260)" },
                    "dark": { "primary": "oklch(0.7 0.15 260)" }
                }),
            },
            StreamChunk::Usage { input_tokens: 120, output_tokens: 40 },
            StreamChunk::Done,
        ]
    }

    async fn app(provider: ScriptedProvider, user_id: Option<&str>) -> App {
        let config = ChatConfig::default();
        let usage = InMemoryUsageRepository::new();
        let ai = Arc::new(ThemeAiService::new(
            Arc::new(provider.clone()),
            Arc::new(usage.clone()),
            &config,
        ));
        let sessions = Arc::new(SessionService::new(Arc::new(InMemorySessionRepository::new())));
        // Requests are authenticated independently of the signed-in state
        // the guards track.
        let caller = Caller::user("alice");
        let draft = DraftStore::with_state(
            Arc::new(InMemoryDraftRepository::new()),
            config.draft_debounce(),
            DraftSnapshot::default(),
        );

        let controller = ChatController::new(
            Arc::new(LocalTransport::new(ai, caller.clone())),
            Arc::new(LocalSessionClient::new(sessions.clone(), caller)),
            Arc::new(DataUrlUploader),
            draft,
            &config,
            user_id.map(str::to_string),
        );
        controller.start().await;

        App { controller, provider, sessions, usage }
    }

    fn doc(text: &str) -> EditorNode {
        prompt_data_to_document(&AIPromptData::text(text))
    }

    async fn eventually<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    async fn saved_sessions(app: &App) -> Vec<crate::models::ChatSession> {
        for _ in 0..100 {
            let sessions = app.sessions.get(&Caller::user("alice")).await.unwrap();
            if !sessions.is_empty() {
                return sessions;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Vec::new()
    }

    #[tokio::test]
    async fn make_it_blue_end_to_end() {
        let app = app(ScriptedProvider::new(blue_script()), Some("alice")).await;
        let c = &app.controller;

        c.set_editor_content(doc("make it blue"));
        assert!(c.can_submit());

        let outcome = c.handle_generate_submit().await;

        assert_eq!(outcome, SubmitOutcome::Finished(StreamStatus::Completed));
        let theme = c.theme.snapshot();
        assert_eq!(theme.light["primary"], "oklch(0.55 0.2 260)");
        assert_eq!(theme.dark["primary"], "oklch(0.7 0.15 260)");

        let messages = c.chat.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].text(), "make it blue");
        let styles = messages[1].theme_styles().unwrap();
        assert_eq!(styles.light["primary"], "oklch(0.55 0.2 260)");

        // Submitting clears the local draft.
        assert!(c.draft.snapshot().is_empty());
        assert_eq!(c.editor.content(), EditorNode::empty_doc());

        let sessions = saved_sessions(&app).await;
        assert_eq!(sessions.len(), 1);
        assert!(eventually(|| c.sessions.current_session_id().is_some()).await);
        let saved = app.sessions.get(&Caller::user("alice")).await.unwrap();
        assert_eq!(saved[0].messages, messages);

        assert!(eventually(|| app.usage.records().len() == 1).await);
        assert_eq!(app.usage.records()[0].prompt_tokens, 120);
        assert!(c.toasts.errors().is_empty());
    }

    #[tokio::test]
    async fn anonymous_submit_resumes_after_login() {
        let app = app(ScriptedProvider::new(blue_script()), None).await;
        let c = &app.controller;
        c.set_editor_content(doc("make it blue"));

        assert_eq!(c.handle_generate_submit().await, SubmitOutcome::AwaitingLogin);
        assert!(c.chat.messages().is_empty());
        assert!(c.post_login.pending().is_some());

        c.on_login("alice").await;

        assert!(c.post_login.pending().is_none());
        assert_eq!(c.chat.messages().len(), 2);
        assert_eq!(c.chat.status(), StreamStatus::Completed);
        assert_eq!(app.provider.received().len(), 1);
        assert!(c.draft.snapshot().is_empty());
    }

    #[tokio::test]
    async fn blank_submit_is_ignored() {
        let app = app(ScriptedProvider::new(blue_script()), Some("alice")).await;
        assert!(!app.controller.can_submit());
        assert_eq!(app.controller.handle_generate_submit().await, SubmitOutcome::Ignored);
        assert!(app.provider.received().is_empty());
    }

    #[tokio::test]
    async fn enhanced_prompt_becomes_the_draft() {
        let provider = ScriptedProvider::new(blue_script())
            .with_enhancement(vec!["A calm ", "ocean blue ", "theme"]);
        let app = app(provider, Some("alice")).await;
        let c = &app.controller;
        c.set_editor_content(doc("blue"));

        let outcome = c.handle_enhance().await;

        assert_eq!(outcome, SubmitOutcome::Finished(StreamStatus::Completed));
        assert_eq!(c.editor.content(), doc("A calm ocean blue theme"));
        assert_eq!(c.prompt_data().content, "A calm ocean blue theme");
    }

    #[tokio::test]
    async fn uploaded_images_are_sent_with_the_prompt() {
        let app = app(ScriptedProvider::new(blue_script()), Some("alice")).await;
        let c = &app.controller;
        c.set_editor_content(doc("match this"));
        c.uploads.upload_batch(vec![ImageFile {
            name: "shot.png".into(),
            mime_type: "image/png".into(),
            bytes: b"png".to_vec(),
        }]);
        c.uploads.settle().await;

        c.handle_generate_submit().await;

        let sent = &app.provider.received()[0].0;
        assert!(sent[0].parts.iter().any(
            |part| matches!(part, MessagePart::Image { url } if url.starts_with("data:image/png;base64,"))
        ));
        assert!(c.uploads.images().is_empty());
    }

    #[tokio::test]
    async fn mentioned_presets_are_inlined() {
        let app = app(ScriptedProvider::new(blue_script()), Some("alice")).await;
        let c = &app.controller;
        let mut ocean = ThemeStyles::default();
        ocean.light.insert("primary".into(), "teal".into());
        c.register_preset("ocean", ocean);

        c.set_editor_content(EditorNode::Doc {
            content: vec![EditorNode::Paragraph {
                content: vec![
                    EditorNode::Text { text: "like ".into() },
                    EditorNode::Mention {
                        attrs: MentionAttrs { id: "ocean".into(), label: "Ocean".into() },
                    },
                ],
            }],
        });
        let prompt = c.prompt_data();
        assert_eq!(prompt.content, "like @Ocean");
        assert_eq!(prompt.mentions[0].theme_data.light["primary"], "teal");

        c.handle_generate_submit().await;

        let sent = &app.provider.received()[0].0;
        assert!(sent[0].parts.iter().any(
            |part| matches!(part, MessagePart::Text { text } if text.starts_with("@Ocean = {"))
        ));

        assert!(c.apply_preset("ocean"));
        assert_eq!(c.theme.snapshot().dark["primary"], "teal");
    }

    #[tokio::test]
    async fn deleting_without_an_open_chat_toasts() {
        let app = app(ScriptedProvider::new(blue_script()), Some("alice")).await;

        assert!(!app.controller.handle_delete_chat().await);
        assert_eq!(app.controller.toasts.errors()[0].title, "No active chat");
    }

    #[tokio::test]
    async fn new_chat_clears_everything() {
        let app = app(ScriptedProvider::new(blue_script()), Some("alice")).await;
        let c = &app.controller;
        c.set_editor_content(doc("make it blue"));
        c.handle_generate_submit().await;
        saved_sessions(&app).await;

        c.set_editor_content(doc("next idea"));
        c.handle_new_chat().await;

        assert!(c.chat.messages().is_empty());
        assert!(c.sessions.current_session_id().is_none());
        assert!(c.draft.snapshot().is_empty());
        // The saved session stays.
        assert_eq!(app.sessions.get(&Caller::user("alice")).await.unwrap().len(), 1);
    }
}
