#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;
    use tweakcn_core::ChatConfig;
    use tweakcn_core::error::ChatError;
    use tweakcn_core::models::{
        AIPromptData, ChatMessage, ChatStore, CreateSessionInput, StreamStatus, ThemeState,
        ToastStore, UpdateSessionInput,
    };
    use tweakcn_core::repositories::{InMemorySessionRepository, InMemoryUsageRepository};
    use tweakcn_core::services::testing::ScriptedProvider;
    use tweakcn_core::services::{
        GENERATE_THEME_TOOL, GenerationTransport, HttpSessionClient, HttpThemeModel,
        SessionClient, SessionService, StreamChunk, ThemeAiService, ThemeGenerationStream,
    };

    use crate::app;
    use crate::state::AppState;

    struct LiveServer {
        url: String,
        usage: InMemoryUsageRepository,
    }

    async fn serve(provider: ScriptedProvider) -> LiveServer {
        let usage = InMemoryUsageRepository::new();
        let ai = ThemeAiService::new(
            Arc::new(provider),
            Arc::new(usage.clone()),
            &ChatConfig::default(),
        );
        let sessions = SessionService::new(Arc::new(InMemorySessionRepository::new()));
        let router = app(AppState::new(Arc::new(ai), Arc::new(sessions)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        LiveServer { url: format!("http://{addr}"), usage }
    }

    async fn wait_for_usage(usage: &InMemoryUsageRepository) {
        for _ in 0..50 {
            if !usage.records().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn generation_round_trips_over_http() {
        let server = serve(ScriptedProvider::new(vec![
            StreamChunk::Text { text: "Here you go.".into() },
            StreamChunk::ToolCallResult {
                id: "call-1".into(),
                name: GENERATE_THEME_TOOL.into(),
                output: json!({ "light": { "primary": "blue" } }),
            },
            StreamChunk::Usage { input_tokens: 10, output_tokens: 5 },
            StreamChunk::Done,
        ]))
        .await;
        let model = HttpThemeModel::new(&server.url, Some("u1".into()));

        let stream = model
            .generate_theme(vec![ChatMessage::user_text("make it blue")], CancellationToken::new())
            .await
            .unwrap();
        let chunks: Vec<StreamChunk> = stream.map(|chunk| chunk.unwrap()).collect().await;

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], StreamChunk::Text { text: "Here you go.".into() });
        assert!(matches!(&chunks[1], StreamChunk::ToolCallResult { output, .. } if output["light"]["primary"] == "blue"));
        assert_eq!(chunks.last(), Some(&StreamChunk::Done));

        wait_for_usage(&server.usage).await;
        assert_eq!(server.usage.records().len(), 1);
    }

    #[tokio::test]
    async fn stopping_a_remote_generation_aborts_both_ends() {
        let mut script = vec![StreamChunk::Text { text: "thinking ".into() }; 10];
        script.push(StreamChunk::Usage { input_tokens: 10, output_tokens: 5 });
        script.push(StreamChunk::Done);
        let server = serve(ScriptedProvider::new(script).with_delay(Duration::from_millis(30))).await;

        let chat = Arc::new(ChatStore::new());
        let toasts = Arc::new(ToastStore::default());
        let stream = Arc::new(ThemeGenerationStream::new(
            Arc::new(HttpThemeModel::new(&server.url, Some("u1".into()))),
            chat.clone(),
            ThemeState::default(),
            toasts.clone(),
        ));

        let running = stream.clone();
        let run = tokio::spawn(async move { running.generate(&AIPromptData::text("blue")).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        stream.stop();

        assert_eq!(run.await.unwrap(), StreamStatus::Aborted);
        assert_eq!(chat.status(), StreamStatus::Aborted);
        assert!(toasts.errors().is_empty());

        // The server side sees the disconnect and never records usage.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(server.usage.records().is_empty());
    }

    #[tokio::test]
    async fn cancelled_request_is_aborted_before_sending() {
        let server = serve(ScriptedProvider::new(vec![StreamChunk::Done])).await;
        let model = HttpThemeModel::new(&server.url, Some("u1".into()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = model
            .generate_theme(vec![ChatMessage::user_text("blue")], cancel)
            .await;

        assert!(matches!(result, Err(ChatError::Aborted)));
    }

    #[tokio::test]
    async fn unknown_session_update_is_not_found() {
        let server = serve(ScriptedProvider::new(vec![])).await;
        let client = HttpSessionClient::new(&server.url, Some("u1".into()));

        let created = client
            .create(CreateSessionInput {
                title: "Chat".into(),
                messages: vec![ChatMessage::user_text("hi")],
            })
            .await
            .unwrap();
        let listed = client.get().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);

        let err = client
            .update(UpdateSessionInput {
                id: "missing".into(),
                title: Some("Blue".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::NotFound(ref message) if message == "Session not found"));
    }

    #[tokio::test]
    async fn anonymous_client_is_unauthorized() {
        let server = serve(ScriptedProvider::new(vec![])).await;
        let client = HttpSessionClient::new(&server.url, None);

        let err = client
            .create(CreateSessionInput { title: "Chat".into(), messages: vec![] })
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Unauthorized(_)));
    }
}
