pub mod ai_service;
pub mod auth;
pub mod draft_store;
pub mod enhance_stream;
pub mod generate_theme_tool;
pub mod guards;
pub mod http_client;
pub mod image_upload;
pub mod model_provider;
pub mod post_login;
pub mod rig_provider;
pub mod session_client;
pub mod session_service;
pub mod session_sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod theme_stream;
pub mod transport;

pub use ai_service::ThemeAiService;
pub use auth::Caller;
pub use draft_store::DraftStore;
pub use enhance_stream::PromptEnhancementStream;
pub use generate_theme_tool::GenerateThemeTool;
pub use guards::{Guards, SubscriptionState};
pub use http_client::{HttpSessionClient, HttpThemeModel, USER_ID_HEADER};
pub use image_upload::{
    DataUrlUploader, ImageFile, ImageUploadCoordinator, ImageUploader, UploadError, UploadedImage,
};
pub use model_provider::{GENERATE_THEME_TOOL, ModelProvider, ResponseStream, StreamChunk, TextStream};
pub use post_login::{PostLoginAction, PostLoginActionKind, PostLoginHandler, PostLoginQueue};
pub use rig_provider::GeminiThemeProvider;
pub use session_client::{LocalSessionClient, SessionClient};
pub use session_service::SessionService;
pub use session_sync::{SessionState, SessionSynchronizer};
pub use theme_stream::ThemeGenerationStream;
pub use transport::{GenerationTransport, LocalTransport};
