//! Structured prompt data and its rich-text editor representation.

use serde::{Deserialize, Serialize};

use super::message::MessagePart;
use super::theme::ThemeStyles;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionReference {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub theme_data: ThemeStyles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub loading: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AIPromptData {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<MentionReference>,
    #[serde(default)]
    pub images: Vec<PromptImage>,
}

impl AIPromptData {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Copy of this prompt carrying only images that finished uploading.
    pub fn with_ready_images(&self) -> Self {
        Self {
            content: self.content.clone(),
            mentions: self.mentions.clone(),
            images: self
                .images
                .iter()
                .filter(|img| !img.loading)
                .map(|img| PromptImage {
                    url: img.url.clone(),
                    loading: false,
                })
                .collect(),
        }
    }

    /// Mentions reduced to id and label, as kept across an enhancement.
    pub fn mention_labels(&self) -> Vec<MentionReference> {
        self.mentions
            .iter()
            .map(|m| MentionReference {
                id: m.id.clone(),
                label: m.label.clone(),
                theme_data: ThemeStyles::default(),
            })
            .collect()
    }
}

/// True when there is no text and no image to send.
pub fn is_empty_prompt(prompt: &AIPromptData) -> bool {
    prompt.content.trim().is_empty() && prompt.images.is_empty()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionAttrs {
    pub id: String,
    pub label: String,
}

/// Node of the editor's JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorNode {
    Doc {
        #[serde(default)]
        content: Vec<EditorNode>,
    },
    Paragraph {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        content: Vec<EditorNode>,
    },
    Text {
        text: String,
    },
    Mention {
        attrs: MentionAttrs,
    },
    HardBreak,
    #[serde(other)]
    Unsupported,
}

impl EditorNode {
    pub fn empty_doc() -> Self {
        EditorNode::Doc {
            content: Vec::new(),
        }
    }

    fn write_text(&self, out: &mut String, mentions: &mut Vec<MentionAttrs>) {
        match self {
            EditorNode::Doc { content } => {
                for (i, node) in content.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    node.write_text(out, mentions);
                }
            }
            EditorNode::Paragraph { content } => {
                for node in content {
                    node.write_text(out, mentions);
                }
            }
            EditorNode::Text { text } => out.push_str(text),
            EditorNode::Mention { attrs } => {
                out.push('@');
                out.push_str(&attrs.label);
                if !mentions.iter().any(|m| m.id == attrs.id) {
                    mentions.push(attrs.clone());
                }
            }
            EditorNode::HardBreak => out.push('\n'),
            EditorNode::Unsupported => {}
        }
    }
}

/// Flattens an editor document into prompt data. Mentions render as
/// `@label`; their theme data is looked up through `resolve`.
pub fn document_to_prompt_data<F>(doc: &EditorNode, resolve: F) -> AIPromptData
where
    F: Fn(&str) -> Option<ThemeStyles>,
{
    let mut content = String::new();
    let mut mentions = Vec::new();
    doc.write_text(&mut content, &mut mentions);

    AIPromptData {
        content,
        mentions: mentions
            .into_iter()
            .map(|attrs| MentionReference {
                theme_data: resolve(&attrs.id).unwrap_or_default(),
                id: attrs.id,
                label: attrs.label,
            })
            .collect(),
        images: Vec::new(),
    }
}

/// Rebuilds an editor document from prompt text, turning `@label`
/// occurrences of known mentions back into mention nodes.
pub fn prompt_data_to_document(prompt: &AIPromptData) -> EditorNode {
    let mut labels: Vec<&MentionReference> = prompt.mentions.iter().collect();
    // Longest label first so "@Ocean Breeze" wins over "@Ocean".
    labels.sort_by(|a, b| b.label.len().cmp(&a.label.len()));

    let paragraphs = prompt
        .content
        .split('\n')
        .map(|line| EditorNode::Paragraph {
            content: line_to_nodes(line, &labels),
        })
        .collect();

    EditorNode::Doc {
        content: paragraphs,
    }
}

fn line_to_nodes(line: &str, mentions: &[&MentionReference]) -> Vec<EditorNode> {
    let mut nodes = Vec::new();
    let mut text = String::new();
    let mut rest = line;

    while !rest.is_empty() {
        let matched = rest.strip_prefix('@').and_then(|after| {
            mentions
                .iter()
                .find(|m| !m.label.is_empty() && after.starts_with(m.label.as_str()))
        });

        if let Some(mention) = matched {
            if !text.is_empty() {
                nodes.push(EditorNode::Text {
                    text: std::mem::take(&mut text),
                });
            }
            nodes.push(EditorNode::Mention {
                attrs: MentionAttrs {
                    id: mention.id.clone(),
                    label: mention.label.clone(),
                },
            });
            rest = &rest[1 + mention.label.len()..];
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                text.push(c);
            }
            rest = chars.as_str();
        }
    }

    if !text.is_empty() {
        nodes.push(EditorNode::Text { text });
    }
    nodes
}

/// Builds the user message parts sent to the model: prompt text, the theme
/// data of each mention as text, then finished images.
pub fn build_user_content_parts(prompt: &AIPromptData) -> Vec<MessagePart> {
    let mut parts = Vec::new();

    if !prompt.content.trim().is_empty() {
        parts.push(MessagePart::Text {
            text: prompt.content.clone(),
        });
    }

    for mention in &prompt.mentions {
        if mention.theme_data.is_empty() {
            continue;
        }
        // ThemeStyles only holds string maps, serialization cannot fail.
        let data = serde_json::to_string(&mention.theme_data).unwrap_or_default();
        parts.push(MessagePart::Text {
            text: format!("@{} = {}", mention.label, data),
        });
    }

    parts.extend(
        prompt
            .images
            .iter()
            .filter(|img| !img.loading)
            .map(|img| MessagePart::Image {
                url: img.url.clone(),
            }),
    );

    parts
}
