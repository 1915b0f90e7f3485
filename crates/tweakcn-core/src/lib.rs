//! Chat session and streaming theme-generation pipeline for the tweakcn
//! theme editor.
//!
//! The client side ([`controllers::ChatController`]) drafts prompts, uploads
//! images, streams enhancements and generations, applies generated themes
//! live and keeps remote chat sessions in sync. The server side
//! ([`services::ThemeAiService`], [`services::SessionService`]) backs the
//! HTTP endpoints of `tweakcn-server`.

pub mod config;
pub mod controllers;
pub mod error;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::ChatConfig;
pub use error::{ChatError, ChatResult, ErrorCode, ErrorResponse};
