pub mod enhance;
pub mod generate;
pub mod sessions;

mod client_test;

use axum::Router;
use axum::routing::post;

use crate::state::AppState;

/// All routes, bound to `state`.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/generate-theme", post(generate::generate_theme))
        .route("/api/enhance-prompt", post(enhance::enhance_prompt))
        .route("/rpc/chat/get", post(sessions::get_sessions))
        .route("/rpc/chat/create", post(sessions::create_session))
        .route("/rpc/chat/update", post(sessions::update_session))
        .route("/rpc/chat/delete", post(sessions::delete_session))
        .route("/rpc/subscription/get", post(sessions::get_subscription))
        .with_state(state)
}
