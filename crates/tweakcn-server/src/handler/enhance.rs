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
use tweakcn_core::models::AIPromptData;

use crate::error::ApiResult;
use crate::state::AppState;

const TRACING_TARGET: &str = "tweakcn_server::handler::enhance";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancePromptRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub prompt_data: Option<AIPromptData>,
}

impl EnhancePromptRequest {
    /// Structured data wins over the plain prompt.
    fn into_prompt(self) -> AIPromptData {
        match (self.prompt_data, self.prompt) {
            (Some(data), _) => data,
            (None, Some(prompt)) => AIPromptData::text(prompt),
            (None, None) => AIPromptData::default(),
        }
    }
}

/// Streams the enhanced prompt as plain text.
pub async fn enhance_prompt(
    State(state): State<AppState>,
    payload: Result<Json<EnhancePromptRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;

    let cancel = CancellationToken::new();
    let mut stream = state
        .ai
        .enhance_prompt(request.into_prompt(), cancel.clone())
        .await?;

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(32);

    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => None,
                item = stream.next() => Some(item),
            };
            match next {
                None => {
                    tracing::debug!(target: TRACING_TARGET, "Client disconnected, cancelling enhancement");
                    cancel.cancel();
                    break;
                }
                Some(None) => break,
                Some(Some(Ok(text))) => {
                    if tx.send(Ok(Bytes::from(text))).await.is_err() {
                        cancel.cancel();
                        break;
                    }
                }
                // A plain-text body cannot carry the failure; the client
                // keeps what arrived.
                Some(Some(Err(e))) => {
                    tracing::warn!(target: TRACING_TARGET, error = %e, "Prompt enhancement failed mid-stream");
                    break;
                }
            }
        }
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}
