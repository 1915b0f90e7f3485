#![forbid(unsafe_code)]
//! HTTP gateway for the tweakcn chat pipeline: streaming theme generation,
//! prompt enhancement and the chat session procedures.

pub mod error;
pub mod extract;
pub mod handler;
pub mod state;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Routes plus request tracing and CORS.
pub fn app(state: AppState) -> Router {
    handler::routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
