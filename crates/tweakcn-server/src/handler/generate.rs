use std::convert::Infallible;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tweakcn_core::models::ChatMessage;
use tweakcn_core::services::StreamChunk;
use tweakcn_core::services::ai_service::GENERATION_FAILED_MESSAGE;

use crate::error::ApiResult;
use crate::extract::CallerIdentity;
use crate::state::AppState;

const TRACING_TARGET: &str = "tweakcn_server::handler::generate";

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
pub struct GenerateThemeRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Streams a theme generation as one JSON chunk per line. The model call
/// is cancelled as soon as the client goes away.
pub async fn generate_theme(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    payload: Result<Json<GenerateThemeRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    tracing::debug!(
        target: TRACING_TARGET,
        messages = request.messages.len(),
        user_id = ?caller.user_id,
        "Starting theme generation"
    );

    let cancel = CancellationToken::new();
    let mut stream = state
        .ai
        .generate_theme(&caller, request.messages, cancel.clone())
        .await?;

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(32);

    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => None,
                item = stream.next() => Some(item),
            };
            let Some(item) = next else {
                tracing::info!(target: TRACING_TARGET, "Client disconnected, cancelling theme generation");
                cancel.cancel();
                break;
            };

            let chunk = match item {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    tracing::error!(target: TRACING_TARGET, error = %e, "Theme generation stream error");
                    StreamChunk::Error {
                        message: GENERATION_FAILED_MESSAGE.to_string(),
                    }
                }
            };
            let last = matches!(chunk, StreamChunk::Error { .. });

            let mut line = match serde_json::to_vec(&chunk) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(target: TRACING_TARGET, error = %e, "Failed to serialize stream chunk");
                    continue;
                }
            };
            line.push(b'\n');

            if tx.send(Ok(Bytes::from(line))).await.is_err() {
                tracing::info!(target: TRACING_TARGET, "Client disconnected, cancelling theme generation");
                cancel.cancel();
                break;
            }
            if last {
                break;
            }
        }
    });

    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}
