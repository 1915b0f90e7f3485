use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::error::{RepositoryError, RepositoryResult};
use super::session_repository::BoxFuture;
use crate::config::ChatConfig;
use crate::models::EditorNode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftImage {
    pub url: String,
}

/// Unsent prompt content as persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
    #[serde(default)]
    pub editor_content_draft: Option<EditorNode>,
    #[serde(default)]
    pub images_draft: Vec<DraftImage>,
}

impl DraftSnapshot {
    pub fn is_empty(&self) -> bool {
        self.editor_content_draft.is_none() && self.images_draft.is_empty()
    }
}

pub trait DraftRepository: Send + Sync + 'static {
    /// Missing or unreadable storage yields an empty draft.
    fn load(&self) -> BoxFuture<'static, RepositoryResult<DraftSnapshot>>;

    fn save(&self, draft: DraftSnapshot) -> BoxFuture<'static, RepositoryResult<()>>;
}

/// Draft persisted as one JSON file.
pub struct DraftJsonRepository {
    file_path: PathBuf,
}

impl DraftJsonRepository {
    /// Uses `config.draft_path`, else `<config dir>/tweakcn/ai_local_draft.json`.
    pub fn from_config(config: &ChatConfig) -> RepositoryResult<Self> {
        if let Some(path) = &config.draft_path {
            return Ok(Self::with_path(path.clone()));
        }

        let config_dir = dirs::config_dir().ok_or_else(|| RepositoryError::InitializationError {
            message: "Cannot determine config directory".into(),
        })?;
        Ok(Self::with_path(config_dir.join("tweakcn").join("ai_local_draft.json")))
    }

    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl DraftRepository for DraftJsonRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<DraftSnapshot>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(DraftSnapshot::default());
            }

            let contents = tokio::fs::read_to_string(&path).await?;
            let draft: DraftSnapshot = serde_json::from_str(&contents)?;
            Ok(draft)
        })
    }

    fn save(&self, draft: DraftSnapshot) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            let json = serde_json::to_string_pretty(&draft)?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, &json).await?;
            tokio::fs::rename(&temp_path, &path).await?;

            Ok(())
        })
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDraftRepository {
    draft: Arc<Mutex<DraftSnapshot>>,
    saves: Arc<Mutex<usize>>,
}

impl InMemoryDraftRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl DraftRepository for InMemoryDraftRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<DraftSnapshot>> {
        let draft = self.draft.clone();
        Box::pin(async move {
            let draft = draft.lock().map_err(|e| RepositoryError::InvalidData {
                message: format!("Failed to lock draft: {}", e),
            })?;
            Ok(draft.clone())
        })
    }

    fn save(&self, next: DraftSnapshot) -> BoxFuture<'static, RepositoryResult<()>> {
        let draft = self.draft.clone();
        let saves = self.saves.clone();
        Box::pin(async move {
            let mut draft = draft.lock().map_err(|e| RepositoryError::InvalidData {
                message: format!("Failed to lock draft: {}", e),
            })?;
            *draft = next;
            if let Ok(mut n) = saves.lock() {
                *n += 1;
            }
            Ok(())
        })
    }
}
