use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tweakcn_core::services::{Caller, USER_ID_HEADER};

/// Caller identity, read from the `x-user-id` header set by the
/// authenticating proxy in front of this server. A missing or blank header
/// is an anonymous caller.
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Caller);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(Self(Caller { user_id }))
    }
}
