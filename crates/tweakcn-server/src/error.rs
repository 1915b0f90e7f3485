//! HTTP mapping of [`ChatError`].

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tweakcn_core::ChatError;
use tweakcn_core::error::{ABORTED_BODY, ABORTED_STATUS};

/// Error returned by every handler. Renders the `{code, message, data?,
/// status}` contract, except for aborts which get a plain-text 499.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ChatError::validation(
            "Invalid input",
            Some(json!({ "body": [rejection.body_text()] })),
        ))
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_abort() {
            return (status_code(ABORTED_STATUS), ABORTED_BODY).into_response();
        }

        let body = self.0.to_response();
        (status_code(body.status), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use tweakcn_core::ErrorResponse;

    async fn render(error: ChatError) -> (StatusCode, Vec<u8>) {
        let response = ApiError(error).into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn abort_is_plain_text_499() {
        let (status, body) = render(ChatError::Aborted).await;

        assert_eq!(status.as_u16(), 499);
        assert_eq!(body, b"Request aborted by user");
    }

    #[tokio::test]
    async fn internal_details_are_hidden() {
        let (status, body) = render(ChatError::Provider("quota exceeded for key abc".into())).await;
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(parsed.code, "UNKNOWN_ERROR");
        assert_eq!(parsed.message, "Internal Server Error");
    }

    #[tokio::test]
    async fn not_found_keeps_its_message() {
        let (status, body) = render(ChatError::session_not_found()).await;
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(parsed.code, "NOT_FOUND");
        assert_eq!(parsed.status, 404);
    }
}
