//! Error taxonomy shared by the chat pipeline and the session procedures.
//!
//! Every user-facing failure is normalized into an [`ErrorResponse`]
//! (`{code, message, data?, status}`). Internal failures are logged with full
//! detail and surfaced only as a generic message.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::repositories::RepositoryError;

/// Status used when the caller aborts a streaming request.
pub const ABORTED_STATUS: u16 = 499;

/// Body returned alongside [`ABORTED_STATUS`].
pub const ABORTED_BODY: &str = "Request aborted by user";

const INTERNAL_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed input. `details` carries field-level information.
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Unauthenticated caller, or a caller that does not own the resource.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// The caller cancelled the request. Never reported as a failure.
    #[error("request aborted by user")]
    Aborted,

    /// Network drop or non-2xx response. Holds the raw response body if any.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    pub fn validation(message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".to_string())
    }

    pub fn session_not_found() -> Self {
        Self::NotFound("Session not found".to_string())
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Aborted => ErrorCode::Aborted,
            Self::Transport(_) | Self::Provider(_) | Self::Repository(_) | Self::Internal(_) => {
                ErrorCode::UnknownError
            }
        }
    }

    pub fn status(&self) -> u16 {
        self.code().status()
    }

    /// Converts the error into the shared response contract.
    ///
    /// Internal variants are logged here and replaced by a generic message.
    pub fn to_response(&self) -> ErrorResponse {
        let code = self.code();
        let (message, data) = match self {
            Self::Validation { message, details } => (
                message.clone(),
                details
                    .clone()
                    .map(|details| serde_json::json!({ "details": details })),
            ),
            Self::Unauthorized(message) | Self::NotFound(message) => (message.clone(), None),
            Self::Aborted => (ABORTED_BODY.to_string(), None),
            Self::Transport(_) | Self::Provider(_) | Self::Repository(_) | Self::Internal(_) => {
                error!(error = %self, "internal error while handling request");
                (INTERNAL_MESSAGE.to_string(), None)
            }
        };

        ErrorResponse {
            code: code.as_str().to_string(),
            message,
            data,
            status: code.status(),
        }
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ChatError::Internal");
        ChatError::Internal(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    NotFound,
    Aborted,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound => "NOT_FOUND",
            Self::Aborted => "ABORTED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::Aborted => ABORTED_STATUS,
            Self::UnknownError => 500,
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "VALIDATION_ERROR" => Some(Self::ValidationError),
            "UNAUTHORIZED" => Some(Self::Unauthorized),
            "NOT_FOUND" => Some(Self::NotFound),
            "ABORTED" => Some(Self::Aborted),
            "UNKNOWN_ERROR" => Some(Self::UnknownError),
            _ => None,
        }
    }
}

/// Wire shape of every user-facing failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub status: u16,
}

impl ErrorResponse {
    /// Rebuilds a typed error from a response received over the wire.
    pub fn into_chat_error(self) -> ChatError {
        match ErrorCode::parse(&self.code) {
            Some(ErrorCode::ValidationError) => ChatError::Validation {
                details: self
                    .data
                    .and_then(|data| data.get("details").cloned()),
                message: self.message,
            },
            Some(ErrorCode::Unauthorized) => ChatError::Unauthorized(self.message),
            Some(ErrorCode::NotFound) => ChatError::NotFound(self.message),
            Some(ErrorCode::Aborted) => ChatError::Aborted,
            Some(ErrorCode::UnknownError) | None => ChatError::Provider(self.message),
        }
    }
}

/// Reduces any stream or request failure to the one message shown to the
/// user. Transport bodies carrying an [`ErrorResponse`] contribute their
/// message; everything else falls back to `default_message`.
pub fn normalize_transport_error(err: &ChatError, default_message: &str) -> String {
    match err {
        ChatError::Validation { message, .. }
        | ChatError::Unauthorized(message)
        | ChatError::NotFound(message) => message.clone(),
        ChatError::Transport(body) => serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .map(|response| response.message)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| default_message.to_string()),
        ChatError::Aborted
        | ChatError::Provider(_)
        | ChatError::Repository(_)
        | ChatError::Internal(_) => default_message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_use_embedded_message() {
        let body = r#"{"code":"UNAUTHORIZED","message":"Sign in to continue","status":401}"#;
        let err = ChatError::Transport(body.to_string());
        assert_eq!(normalize_transport_error(&err, "fallback"), "Sign in to continue");

        let err = ChatError::Transport("<html>bad gateway</html>".to_string());
        assert_eq!(normalize_transport_error(&err, "fallback"), "fallback");

        let err = ChatError::Provider("upstream 503 from provider".to_string());
        assert_eq!(normalize_transport_error(&err, "fallback"), "fallback");
    }

    #[test]
    fn validation_error_carries_details() {
        let err = ChatError::validation(
            "Invalid input",
            Some(serde_json::json!({ "title": "must not be empty" })),
        );
        let response = err.to_response();

        assert_eq!(response.code, "VALIDATION_ERROR");
        assert_eq!(response.status, 400);
        assert_eq!(
            response.data,
            Some(serde_json::json!({ "details": { "title": "must not be empty" } }))
        );
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = ChatError::Internal("sqlite file /var/db locked".to_string());
        let response = err.to_response();

        assert_eq!(response.code, "UNKNOWN_ERROR");
        assert_eq!(response.status, 500);
        assert_eq!(response.message, "Internal Server Error");
    }

    #[test]
    fn abort_maps_to_499() {
        assert_eq!(ChatError::Aborted.status(), 499);
        assert!(ChatError::Aborted.is_abort());
    }

    #[test]
    fn response_round_trips_to_typed_error() {
        let response = ChatError::session_not_found().to_response();
        let json = serde_json::to_string(&response).unwrap();
        let parsed: ErrorResponse = serde_json::from_str(&json).unwrap();

        assert!(matches!(parsed.into_chat_error(), ChatError::NotFound(m) if m == "Session not found"));
    }
}
