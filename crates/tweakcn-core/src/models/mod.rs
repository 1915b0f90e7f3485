pub mod chat_store;
pub mod editor;
pub mod message;
pub mod notifications;
pub mod prompt;
pub mod session;
pub mod theme;
pub mod token_usage;

pub use chat_store::{ChatSnapshot, ChatStore, StreamStatus};
pub use editor::EditorBuffer;
pub use message::{ChatMessage, MessageMetadata, MessagePart, MessageRole};
pub use notifications::{Toast, ToastLevel, ToastStore};
pub use prompt::{
    AIPromptData, EditorNode, MentionReference, PromptImage, build_user_content_parts,
    document_to_prompt_data, is_empty_prompt, prompt_data_to_document,
};
pub use session::{
    ChatSession, CreateSessionInput, DeleteSessionInput, DeleteSessionOutput, UpdateSessionInput,
};
pub use theme::{ThemeMode, ThemeState, ThemeStyleProps, ThemeStyles, preset_styles};
pub use token_usage::{SubscriptionStatus, TokenUsage, UsageRecord};
