use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::draft_store::DraftStore;
use crate::config::ChatConfig;
use crate::models::{PromptImage, ToastStore};
use crate::repositories::DraftImage;

/// An image picked by the user, not yet uploaded.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("You can only upload up to {max} images")]
    TooManyFiles { max: usize },

    #[error("{name} exceeds the {max_mb}MB limit")]
    FileTooLarge { name: String, max_mb: u64 },

    #[error("{name} is not an image")]
    NotAnImage { name: String },

    #[error("Failed to upload {name}: {reason}")]
    Failed { name: String, reason: String },
}

impl UploadError {
    fn title(&self) -> &'static str {
        match self {
            UploadError::TooManyFiles { .. } => "Maximum files reached",
            UploadError::FileTooLarge { .. } => "File too large",
            UploadError::NotAnImage { .. } => "Unsupported file",
            UploadError::Failed { .. } => "Upload failed",
        }
    }
}

/// Turns a picked file into a url the model can read.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, file: &ImageFile) -> Result<String, UploadError>;
}

/// Inlines the image as a base64 data url.
#[derive(Debug, Default)]
pub struct DataUrlUploader;

#[async_trait]
impl ImageUploader for DataUrlUploader {
    async fn upload(&self, file: &ImageFile) -> Result<String, UploadError> {
        let b64 = base64::engine::general_purpose::STANDARD.encode(&file.bytes);
        Ok(format!("data:{};base64,{}", file.mime_type, b64))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    /// Empty while loading.
    pub url: String,
    pub loading: bool,
    pub error: Option<String>,
}

impl UploadedImage {
    fn is_ready(&self) -> bool {
        !self.loading && self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub accepted: usize,
    pub rejected: Vec<UploadError>,
}

struct Slot {
    id: u64,
    image: UploadedImage,
}

#[derive(Default)]
struct Slots {
    entries: Vec<Slot>,
    next_id: u64,
}

struct UploadInner {
    uploader: Arc<dyn ImageUploader>,
    draft: DraftStore,
    toasts: Arc<ToastStore>,
    max_files: usize,
    max_file_size: u64,
    slots: Mutex<Slots>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    initialized: AtomicBool,
}

/// Images attached to the prompt being composed.
///
/// Entries are added optimistically as `loading` and uploaded concurrently.
/// Only finished, error-free images are mirrored into the draft.
#[derive(Clone)]
pub struct ImageUploadCoordinator {
    inner: Arc<UploadInner>,
}

impl ImageUploadCoordinator {
    pub fn new(
        uploader: Arc<dyn ImageUploader>,
        draft: DraftStore,
        toasts: Arc<ToastStore>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            inner: Arc::new(UploadInner {
                uploader,
                draft,
                toasts,
                max_files: config.max_image_files,
                max_file_size: config.max_image_file_size,
                slots: Mutex::new(Slots::default()),
                tasks: Mutex::new(Vec::new()),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    pub fn images(&self) -> Vec<UploadedImage> {
        self.inner
            .slots
            .lock()
            .entries
            .iter()
            .map(|slot| slot.image.clone())
            .collect()
    }

    pub fn is_some_uploading(&self) -> bool {
        self.inner.slots.lock().entries.iter().any(|slot| slot.image.loading)
    }

    /// Images as attached to a prompt. Failed uploads are left out; loading
    /// ones are flagged.
    pub fn prompt_images(&self) -> Vec<PromptImage> {
        self.inner
            .slots
            .lock()
            .entries
            .iter()
            .filter(|slot| slot.image.error.is_none())
            .map(|slot| PromptImage {
                url: slot.image.url.clone(),
                loading: slot.image.loading,
            })
            .collect()
    }

    /// Seeds the list from the persisted draft. Only the first call has an
    /// effect.
    pub fn initialize_from_draft(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        let drafts = self.inner.draft.images();
        if drafts.is_empty() {
            return;
        }

        let mut slots = self.inner.slots.lock();
        for draft in drafts.into_iter().take(self.inner.max_files) {
            let id = slots.next_id;
            slots.next_id += 1;
            slots.entries.push(Slot {
                id,
                image: UploadedImage {
                    url: draft.url,
                    loading: false,
                    error: None,
                },
            });
        }
        debug!(count = slots.entries.len(), "Restored images from draft");
    }

    /// Accepts files in order until the list is full; each rejection gets
    /// a toast. Accepted files upload concurrently.
    pub fn upload_batch(&self, files: Vec<ImageFile>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut accepted = Vec::new();

        {
            let mut slots = self.inner.slots.lock();
            for file in files {
                if let Err(e) = self.check(&file, slots.entries.len()) {
                    outcome.rejected.push(e);
                    continue;
                }

                let id = slots.next_id;
                slots.next_id += 1;
                slots.entries.push(Slot {
                    id,
                    image: UploadedImage {
                        url: String::new(),
                        loading: true,
                        error: None,
                    },
                });
                accepted.push((id, file));
            }
        }

        for rejection in &outcome.rejected {
            warn!(reason = %rejection, "Rejected image");
            self.inner
                .toasts
                .error(rejection.title(), Some(&rejection.to_string()));
        }

        outcome.accepted = accepted.len();
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        for (id, file) in accepted {
            let inner = self.inner.clone();
            tasks.push(tokio::spawn(async move {
                let result = inner.uploader.upload(&file).await;
                complete(&inner, id, &file.name, result);
            }));
        }
        outcome
    }

    fn check(&self, file: &ImageFile, current: usize) -> Result<(), UploadError> {
        if !file.mime_type.starts_with("image/") {
            return Err(UploadError::NotAnImage {
                name: file.name.clone(),
            });
        }
        if file.bytes.len() as u64 > self.inner.max_file_size {
            return Err(UploadError::FileTooLarge {
                name: file.name.clone(),
                max_mb: self.inner.max_file_size / (1024 * 1024),
            });
        }
        if current >= self.inner.max_files {
            return Err(UploadError::TooManyFiles {
                max: self.inner.max_files,
            });
        }
        Ok(())
    }

    /// Removes the entry at `index`, loading or not. A pending upload for it
    /// is discarded when it completes.
    pub fn remove_at(&self, index: usize) -> Option<UploadedImage> {
        let removed = {
            let mut slots = self.inner.slots.lock();
            (index < slots.entries.len()).then(|| slots.entries.remove(index).image)
        };
        if removed.is_some() {
            sync_draft(&self.inner);
        }
        removed
    }

    /// Removes the completed entry with `url`.
    pub fn remove_url(&self, url: &str) -> bool {
        let removed = {
            let mut slots = self.inner.slots.lock();
            match slots
                .entries
                .iter()
                .position(|slot| !slot.image.loading && slot.image.url == url)
            {
                Some(index) => {
                    slots.entries.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            sync_draft(&self.inner);
        }
        removed
    }

    pub fn clear(&self) {
        self.inner.slots.lock().entries.clear();
        sync_draft(&self.inner);
    }

    /// Waits for every upload started so far.
    pub async fn settle(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = ?e, "Upload task panicked");
            }
        }
    }
}

fn complete(inner: &UploadInner, id: u64, name: &str, result: Result<String, UploadError>) {
    let failure = {
        let mut slots = inner.slots.lock();
        let Some(slot) = slots.entries.iter_mut().find(|slot| slot.id == id) else {
            debug!(file = %name, "Discarding upload of removed image");
            return;
        };

        slot.image.loading = false;
        match result {
            Ok(url) => {
                slot.image.url = url;
                None
            }
            Err(e) => {
                slot.image.error = Some(e.to_string());
                Some(e)
            }
        }
    };

    match failure {
        None => info!(file = %name, "Image uploaded"),
        Some(e) => {
            warn!(file = %name, error = %e, "Image upload failed");
            inner.toasts.error(e.title(), Some(&e.to_string()));
        }
    }
    sync_draft(inner);
}

fn sync_draft(inner: &UploadInner) {
    let ready: Vec<DraftImage> = inner
        .slots
        .lock()
        .entries
        .iter()
        .filter(|slot| slot.image.is_ready())
        .map(|slot| DraftImage {
            url: slot.image.url.clone(),
        })
        .collect();
    inner.draft.set_images(ready);
}
