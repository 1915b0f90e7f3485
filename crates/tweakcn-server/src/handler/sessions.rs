//! Session and subscription procedures. Every procedure is a POST taking a
//! JSON input and returning JSON.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use tweakcn_core::models::{
    ChatSession, CreateSessionInput, DeleteSessionInput, DeleteSessionOutput, SubscriptionStatus,
    UpdateSessionInput,
};

use crate::error::ApiResult;
use crate::extract::CallerIdentity;
use crate::state::AppState;

pub async fn get_sessions(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> ApiResult<Json<Vec<ChatSession>>> {
    Ok(Json(state.sessions.get(&caller).await?))
}

pub async fn create_session(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    payload: Result<Json<CreateSessionInput>, JsonRejection>,
) -> ApiResult<Json<ChatSession>> {
    let Json(input) = payload?;
    Ok(Json(state.sessions.create(&caller, input).await?))
}

pub async fn update_session(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    payload: Result<Json<UpdateSessionInput>, JsonRejection>,
) -> ApiResult<Json<ChatSession>> {
    let Json(input) = payload?;
    Ok(Json(state.sessions.update(&caller, input).await?))
}

pub async fn delete_session(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    payload: Result<Json<DeleteSessionInput>, JsonRejection>,
) -> ApiResult<Json<DeleteSessionOutput>> {
    let Json(input) = payload?;
    Ok(Json(state.sessions.delete(&caller, input).await?))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> ApiResult<Json<SubscriptionStatus>> {
    Ok(Json(state.ai.subscription_status(&caller).await?))
}
