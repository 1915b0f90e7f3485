use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Token name to CSS value, e.g. `"primary" -> "oklch(0.55 0.2 260)"`.
pub type ThemeStyleProps = BTreeMap<String, String>;

/// Style tokens a theme may define. Anything else coming out of a tool
/// result is dropped.
pub const THEME_TOKENS: &[&str] = &[
    "background",
    "foreground",
    "card",
    "card-foreground",
    "popover",
    "popover-foreground",
    "primary",
    "primary-foreground",
    "secondary",
    "secondary-foreground",
    "muted",
    "muted-foreground",
    "accent",
    "accent-foreground",
    "destructive",
    "destructive-foreground",
    "border",
    "input",
    "ring",
    "chart-1",
    "chart-2",
    "chart-3",
    "chart-4",
    "chart-5",
    "sidebar",
    "sidebar-foreground",
    "sidebar-primary",
    "sidebar-primary-foreground",
    "sidebar-accent",
    "sidebar-accent-foreground",
    "sidebar-border",
    "sidebar-ring",
    "font-sans",
    "font-serif",
    "font-mono",
    "radius",
    "shadow-color",
    "shadow-opacity",
    "shadow-blur",
    "shadow-spread",
    "shadow-offset-x",
    "shadow-offset-y",
    "letter-spacing",
    "spacing",
];

pub fn is_theme_token(name: &str) -> bool {
    THEME_TOKENS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
}

#[derive(Debug, Error)]
pub enum ThemeParseError {
    #[error("theme output must be a JSON object")]
    NotAnObject,

    #[error("mode `{0}` must be an object of token values")]
    InvalidMode(String),

    #[error("theme output defines neither light nor dark styles")]
    Empty,
}

/// Per-mode style maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeStyles {
    #[serde(default)]
    pub light: ThemeStyleProps,
    #[serde(default)]
    pub dark: ThemeStyleProps,
}

impl ThemeStyles {
    pub fn mode(&self, mode: ThemeMode) -> &ThemeStyleProps {
        match mode {
            ThemeMode::Light => &self.light,
            ThemeMode::Dark => &self.dark,
        }
    }

    pub fn mode_mut(&mut self, mode: ThemeMode) -> &mut ThemeStyleProps {
        match mode {
            ThemeMode::Light => &mut self.light,
            ThemeMode::Dark => &mut self.dark,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.light.is_empty() && self.dark.is_empty()
    }

    /// Overlays `other` onto `self` per mode and per token. Tokens absent from
    /// `other` keep their current value.
    pub fn merge(&mut self, other: &ThemeStyles) {
        for (token, value) in &other.light {
            self.light.insert(token.clone(), value.clone());
        }
        for (token, value) in &other.dark {
            self.dark.insert(token.clone(), value.clone());
        }
    }

    pub fn merged(mut self, other: &ThemeStyles) -> Self {
        self.merge(other);
        self
    }

    /// Validates a raw `generateTheme` tool output.
    ///
    /// Unknown tokens and non-string or blank values are dropped with a
    /// warning. The result is partial: modes or tokens the model omitted are
    /// simply absent.
    pub fn from_tool_output(value: &serde_json::Value) -> Result<Self, ThemeParseError> {
        // Some providers wrap the payload as `{ "themeStyles": {...} }`.
        let value = value.get("themeStyles").unwrap_or(value);
        let object = value.as_object().ok_or(ThemeParseError::NotAnObject)?;

        let mut styles = ThemeStyles::default();
        for (mode_name, mode) in [("light", ThemeMode::Light), ("dark", ThemeMode::Dark)] {
            let Some(raw) = object.get(mode_name) else {
                continue;
            };
            let raw = raw
                .as_object()
                .ok_or_else(|| ThemeParseError::InvalidMode(mode_name.to_string()))?;

            let props = styles.mode_mut(mode);
            for (token, value) in raw {
                if !is_theme_token(token) {
                    warn!(token = %token, mode = mode_name, "Dropping unknown theme token");
                    continue;
                }
                match value.as_str().map(str::trim) {
                    Some(v) if !v.is_empty() => {
                        props.insert(token.clone(), v.to_string());
                    }
                    _ => {
                        warn!(token = %token, mode = mode_name, "Dropping theme token with invalid value");
                    }
                }
            }
        }

        if styles.is_empty() {
            return Err(ThemeParseError::Empty);
        }
        Ok(styles)
    }
}

/// Builds the full styles of a preset. Dark mode inherits the preset's light
/// tokens before its own dark overrides are applied.
pub fn preset_styles(defaults: &ThemeStyles, preset: &ThemeStyles) -> ThemeStyles {
    let light = defaults
        .light
        .iter()
        .chain(preset.light.iter())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let dark = defaults
        .dark
        .iter()
        .chain(preset.light.iter())
        .chain(preset.dark.iter())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    ThemeStyles { light, dark }
}

/// The active theme, shared between the tool-result handler and explicit
/// edits. Writers merge; observers subscribe for changes.
#[derive(Clone)]
pub struct ThemeState {
    tx: Arc<watch::Sender<ThemeStyles>>,
}

impl ThemeState {
    pub fn new(initial: ThemeStyles) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Merges a partial update into the active theme.
    pub fn apply(&self, update: &ThemeStyles) {
        self.tx.send_modify(|current| current.merge(update));
        debug!(
            light = update.light.len(),
            dark = update.dark.len(),
            "Applied theme update"
        );
    }

    /// Replaces the whole theme. Only used for explicit resets.
    pub fn reset_to(&self, styles: ThemeStyles) {
        self.tx.send_replace(styles);
    }

    pub fn snapshot(&self) -> ThemeStyles {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ThemeStyles> {
        self.tx.subscribe()
    }
}

impl Default for ThemeState {
    fn default() -> Self {
        Self::new(ThemeStyles::default())
    }
}
