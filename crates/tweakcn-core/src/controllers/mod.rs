pub mod chat_controller;
mod pipeline_test;

pub use chat_controller::{ChatController, GenerationOptions, SubmitOutcome, ThemeGenerationPayload};
