use std::sync::Arc;

use anyhow::Context;
use tweakcn_core::ChatConfig;
use tweakcn_core::repositories::{SessionSqliteRepository, SqliteDatabase, UsageSqliteRepository};
use tweakcn_core::services::{GeminiThemeProvider, SessionService, ThemeAiService};

/// Services shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub ai: Arc<ThemeAiService>,
    pub sessions: Arc<SessionService>,
}

impl AppState {
    pub fn new(ai: Arc<ThemeAiService>, sessions: Arc<SessionService>) -> Self {
        Self { ai, sessions }
    }

    /// Opens the database and the Gemini provider named by `config`.
    pub async fn from_config(config: &ChatConfig) -> anyhow::Result<Self> {
        let db = SqliteDatabase::connect(&config.database_url)
            .await
            .with_context(|| format!("failed to open database {}", config.database_url))?;
        let provider = GeminiThemeProvider::from_config(config).context("failed to create model provider")?;

        let ai = ThemeAiService::new(
            Arc::new(provider),
            Arc::new(UsageSqliteRepository::new(&db)),
            config,
        );
        let sessions = SessionService::new(Arc::new(SessionSqliteRepository::new(&db)));

        Ok(Self::new(Arc::new(ai), Arc::new(sessions)))
    }
}
