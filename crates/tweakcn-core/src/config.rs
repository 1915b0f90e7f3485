use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::repositories::{RepositoryError, RepositoryResult};

/// 5 MiB, same as the attachment limit.
pub const DEFAULT_MAX_IMAGE_FILE_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_IMAGE_FILES: usize = 3;
pub const DEFAULT_MAX_GENERATION_STEPS: usize = 5;

const ENV_PREFIX: &str = "TWEAKCN_";

/// Settings for the chat pipeline and the server.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub max_image_files: usize,
    /// Bytes.
    pub max_image_file_size: u64,
    /// Upper bound on sequential model steps per generation.
    pub max_generation_steps: usize,
    /// Quiet period before a draft change is persisted.
    pub draft_debounce_ms: u64,
    pub generation_model: String,
    pub enhancement_model: String,
    pub database_url: String,
    pub bind_address: String,
    /// Name of the env var holding the provider key, never the key itself.
    pub api_key_env: String,
    /// Where the draft is persisted. `None` uses the platform config dir.
    pub draft_path: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_image_files: DEFAULT_MAX_IMAGE_FILES,
            max_image_file_size: DEFAULT_MAX_IMAGE_FILE_SIZE,
            max_generation_steps: DEFAULT_MAX_GENERATION_STEPS,
            draft_debounce_ms: 300,
            generation_model: "gemini-2.5-flash".to_string(),
            enhancement_model: "gemini-2.5-flash-lite".to_string(),
            database_url: "sqlite://tweakcn.db".to_string(),
            bind_address: "127.0.0.1:3000".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            draft_path: None,
        }
    }
}

impl ChatConfig {
    pub fn draft_debounce(&self) -> Duration {
        Duration::from_millis(self.draft_debounce_ms)
    }

    /// `<config dir>/tweakcn/config.json`
    pub fn default_path() -> RepositoryResult<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| RepositoryError::InitializationError {
                message: "Cannot determine config directory".into(),
            })
            .map(|p| p.join("tweakcn").join("config.json"))
    }

    /// Reads the JSON file at `path`. A missing file yields the defaults.
    pub async fn load_from_path(path: &Path) -> RepositoryResult<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let config: ChatConfig = serde_json::from_str(&contents)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// File, then `TWEAKCN_*` overrides from the process environment.
    pub async fn load(path: Option<&Path>) -> RepositoryResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let mut config = Self::load_from_path(&path).await?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides from `lookup`, keyed by `TWEAKCN_<FIELD>`.
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("GENERATION_MODEL") {
            self.generation_model = v;
        }
        if let Some(v) = var("ENHANCEMENT_MODEL") {
            self.enhancement_model = v;
        }
        if let Some(v) = var("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = var("BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Some(v) = var("API_KEY_ENV") {
            self.api_key_env = v;
        }
        if let Some(v) = var("DRAFT_PATH") {
            self.draft_path = Some(PathBuf::from(v));
        }

        parse_override(var("MAX_IMAGE_FILES"), "MAX_IMAGE_FILES", &mut self.max_image_files);
        parse_override(
            var("MAX_IMAGE_FILE_SIZE"),
            "MAX_IMAGE_FILE_SIZE",
            &mut self.max_image_file_size,
        );
        parse_override(
            var("MAX_GENERATION_STEPS"),
            "MAX_GENERATION_STEPS",
            &mut self.max_generation_steps,
        );
        parse_override(var("DRAFT_DEBOUNCE_MS"), "DRAFT_DEBOUNCE_MS", &mut self.draft_debounce_ms);
    }
}

fn parse_override<T: std::str::FromStr>(raw: Option<String>, name: &str, target: &mut T) {
    let Some(raw) = raw else { return };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(var = %format!("{ENV_PREFIX}{name}"), value = %raw, "Ignoring invalid config override"),
    }
}
