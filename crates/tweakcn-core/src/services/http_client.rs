//! `reqwest` clients for a remote tweakcn server.

use anyhow::anyhow;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::model_provider::{ResponseStream, StreamChunk, TextStream};
use super::session_client::SessionClient;
use super::transport::GenerationTransport;
use crate::error::{ABORTED_STATUS, ChatError, ChatResult, ErrorResponse};
use crate::models::{
    AIPromptData, ChatMessage, ChatSession, CreateSessionInput, DeleteSessionInput,
    DeleteSessionOutput, SubscriptionStatus, UpdateSessionInput,
};

/// Header carrying the authenticated user id to the server.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
struct HttpBase {
    http: reqwest::Client,
    base_url: String,
    user_id: Option<String>,
}

impl HttpBase {
    fn new(base_url: &str, user_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.post(format!("{}{}", self.base_url, path));
        match &self.user_id {
            Some(user_id) => request.header(USER_ID_HEADER, user_id),
            None => request,
        }
    }

    async fn call<I: Serialize + Sync, O: DeserializeOwned>(&self, path: &str, input: &I) -> ChatResult<O> {
        let response = self.post(path).json(input).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        response.json::<O>().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> ChatError {
    warn!(error = %e, "HTTP request failed");
    ChatError::Transport(e.to_string())
}

/// Turns a non-2xx response into a typed error.
async fn error_from_response(response: reqwest::Response) -> ChatError {
    let status = response.status().as_u16();
    if status == ABORTED_STATUS {
        return ChatError::Aborted;
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) if !parsed.code.is_empty() => parsed.into_chat_error(),
        _ => {
            debug!(status, "Error response without error contract body");
            ChatError::Transport(body)
        }
    }
}

/// Session procedures over HTTP.
pub struct HttpSessionClient {
    base: HttpBase,
}

impl HttpSessionClient {
    pub fn new(base_url: &str, user_id: Option<String>) -> Self {
        Self {
            base: HttpBase::new(base_url, user_id),
        }
    }
}

#[async_trait]
impl SessionClient for HttpSessionClient {
    async fn get(&self) -> ChatResult<Vec<ChatSession>> {
        self.base.call("/rpc/chat/get", &serde_json::json!({})).await
    }

    async fn create(&self, input: CreateSessionInput) -> ChatResult<ChatSession> {
        self.base.call("/rpc/chat/create", &input).await
    }

    async fn update(&self, input: UpdateSessionInput) -> ChatResult<ChatSession> {
        self.base.call("/rpc/chat/update", &input).await
    }

    async fn delete(&self, input: DeleteSessionInput) -> ChatResult<DeleteSessionOutput> {
        self.base.call("/rpc/chat/delete", &input).await
    }
}

/// Generation and enhancement endpoints over HTTP.
pub struct HttpThemeModel {
    base: HttpBase,
}

impl HttpThemeModel {
    pub fn new(base_url: &str, user_id: Option<String>) -> Self {
        Self {
            base: HttpBase::new(base_url, user_id),
        }
    }

    async fn start(
        &self,
        path: &str,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> ChatResult<reqwest::Response> {
        let send = self.base.post(path).json(&body).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Aborted),
            result = send => result.map_err(transport_error)?,
        };
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationTransport for HttpThemeModel {
    async fn generate_theme(
        &self,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> ChatResult<ResponseStream> {
        let response = self
            .start(
                "/api/generate-theme",
                serde_json::json!({ "messages": messages }),
                &cancel,
            )
            .await?;

        let mut bytes = response.bytes_stream();
        let stream: ResponseStream = Box::pin(async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        buffer.extend_from_slice(&chunk);
                        while let Some(line) = take_line(&mut buffer) {
                            match parse_line(&line) {
                                Some(Ok(parsed)) => yield Ok(parsed),
                                Some(Err(e)) => {
                                    yield Err(e);
                                    return;
                                }
                                None => {}
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(anyhow!("Connection lost: {e}"));
                        return;
                    }
                }
            }
            if let Some(Ok(parsed)) = parse_line(&buffer) {
                yield Ok(parsed);
            }
        });
        Ok(stream)
    }

    async fn enhance_prompt(
        &self,
        prompt: AIPromptData,
        cancel: CancellationToken,
    ) -> ChatResult<TextStream> {
        let response = self
            .start(
                "/api/enhance-prompt",
                serde_json::json!({ "prompt": prompt.content, "promptData": prompt }),
                &cancel,
            )
            .await?;

        let mut bytes = response.bytes_stream();
        let stream: TextStream = Box::pin(async_stream::stream! {
            let mut pending: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        pending.extend_from_slice(&chunk);
                        let text = take_utf8(&mut pending, false);
                        if !text.is_empty() {
                            yield Ok(text);
                        }
                    }
                    Err(e) => {
                        yield Err(anyhow!("Connection lost: {e}"));
                        return;
                    }
                }
            }
            let rest = take_utf8(&mut pending, true);
            if !rest.is_empty() {
                yield Ok(rest);
            }
        });
        Ok(stream)
    }

    async fn subscription_status(&self) -> ChatResult<SubscriptionStatus> {
        self.base
            .call("/rpc/subscription/get", &serde_json::json!({}))
            .await
    }
}

/// Pops one `\n`-terminated line off the front of `buffer`.
fn take_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buffer.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=pos).collect();
    line.pop();
    Some(line)
}

fn parse_line(line: &[u8]) -> Option<anyhow::Result<StreamChunk>> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_slice(trimmed).map_err(|e| anyhow!("Malformed stream chunk: {e}")))
}

/// Decodes the buffered bytes. Invalid sequences become U+FFFD. A
/// character split across reads waits for the rest, unless `end` is set.
fn take_utf8(pending: &mut Vec<u8>, end: bool) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    Some(invalid) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + invalid);
                    }
                    None if end => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.clear();
                        return out;
                    }
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}
