use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::models::EditorNode;
use crate::config::ChatConfig;
use crate::repositories::{
    DraftImage, DraftJsonRepository, DraftRepository, DraftSnapshot, RepositoryResult,
};

/// Unsent editor content and image urls, persisted after a quiet period.
///
/// Cloning shares the same draft.
#[derive(Clone)]
pub struct DraftStore {
    inner: Arc<DraftInner>,
}

struct DraftInner {
    state: Mutex<DraftSnapshot>,
    repo: Arc<dyn DraftRepository>,
    debounce: Duration,
    revision: AtomicU64,
}

impl DraftStore {
    /// Loads the persisted draft. Unreadable storage starts empty.
    pub async fn load(repo: Arc<dyn DraftRepository>, debounce: Duration) -> Self {
        let initial = match repo.load().await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(error = ?e, "Failed to load draft, starting empty");
                DraftSnapshot::default()
            }
        };
        Self::with_state(repo, debounce, initial)
    }

    /// Loads the draft from the JSON file named by `config`.
    pub async fn open(config: &ChatConfig) -> RepositoryResult<Self> {
        let repo = DraftJsonRepository::from_config(config)?;
        Ok(Self::load(Arc::new(repo), config.draft_debounce()).await)
    }

    pub fn with_state(repo: Arc<dyn DraftRepository>, debounce: Duration, initial: DraftSnapshot) -> Self {
        Self {
            inner: Arc::new(DraftInner {
                state: Mutex::new(initial),
                repo,
                debounce,
                revision: AtomicU64::new(0),
            }),
        }
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        self.inner.state.lock().clone()
    }

    pub fn editor_content(&self) -> Option<EditorNode> {
        self.inner.state.lock().editor_content_draft.clone()
    }

    pub fn images(&self) -> Vec<DraftImage> {
        self.inner.state.lock().images_draft.clone()
    }

    pub fn set_editor_content(&self, content: Option<EditorNode>) {
        self.inner.state.lock().editor_content_draft = content;
        self.schedule_persist();
    }

    pub fn set_images(&self, images: Vec<DraftImage>) {
        {
            let mut state = self.inner.state.lock();
            if state.images_draft == images {
                return;
            }
            state.images_draft = images;
        }
        self.schedule_persist();
    }

    pub fn clear(&self) {
        *self.inner.state.lock() = DraftSnapshot::default();
        self.schedule_persist();
    }

    /// Persists the current draft now, superseding any pending write.
    pub async fn flush(&self) {
        self.inner.revision.fetch_add(1, Ordering::SeqCst);
        persist(&self.inner).await;
    }

    fn schedule_persist(&self) {
        let revision = self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();

        tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            // A newer change restarted the quiet period.
            if inner.revision.load(Ordering::SeqCst) != revision {
                return;
            }
            persist(&inner).await;
        });
    }
}

async fn persist(inner: &DraftInner) {
    let snapshot = inner.state.lock().clone();
    match inner.repo.save(snapshot).await {
        Ok(()) => debug!("Persisted draft"),
        Err(e) => warn!(error = ?e, "Failed to persist draft"),
    }
}
