use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};

use super::model_provider::GENERATE_THEME_TOOL;
use crate::models::theme::{THEME_TOKENS, ThemeStyleProps, ThemeStyles};

/// Arguments the model supplies: token values per mode.
#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateThemeArgs {
    #[serde(default)]
    pub light: ThemeStyleProps,
    #[serde(default)]
    pub dark: ThemeStyleProps,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateThemeToolError {
    #[error("Invalid theme: {0}")]
    InvalidTheme(String),
}

/// Validates the model's styles and echoes the accepted subset back as the
/// tool result. The result is what gets applied to the live theme.
#[derive(Clone, Default)]
pub struct GenerateThemeTool;

impl Tool for GenerateThemeTool {
    const NAME: &'static str = GENERATE_THEME_TOOL;
    type Error = GenerateThemeToolError;
    type Args = GenerateThemeArgs;
    type Output = ThemeStyles;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        let token_schema: serde_json::Map<String, serde_json::Value> = THEME_TOKENS
            .iter()
            .map(|token| (token.to_string(), serde_json::json!({ "type": "string" })))
            .collect();

        ToolDefinition {
            name: GENERATE_THEME_TOOL.to_string(),
            description: "Generate or modify the shadcn/ui theme. Provide CSS values for \
                         the tokens to change in light and/or dark mode. Colors should be \
                         oklch() or hex strings. Tokens you omit keep their current value."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "light": { "type": "object", "properties": token_schema.clone() },
                    "dark": { "type": "object", "properties": token_schema }
                },
                "required": []
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let raw = serde_json::json!({ "light": args.light, "dark": args.dark });
        let styles = ThemeStyles::from_tool_output(&raw)
            .map_err(|e| GenerateThemeToolError::InvalidTheme(e.to_string()))?;

        tracing::info!(
            light = styles.light.len(),
            dark = styles.dark.len(),
            "generateTheme called"
        );

        Ok(styles)
    }
}
