use serde::{Deserialize, Serialize};

use crate::history::VideoMetadata;

/// A backend-ready message (provider-agnostic).
///
/// Built fresh every turn from the Message Log plus the context preamble;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub parts: Vec<PromptPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptPart {
    Text { text: String },
    File(FileRef),
}

/// A media reference with a directly usable URL.
///
/// `uri` is `None` only while the history converter is still resolving
/// signed URLs; every `FileRef` it returns has it set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_metadata: Option<VideoMetadata>,
}

// ── Convenience constructors ───────────────────────────────────────

impl PromptMessage {
    pub fn user(parts: Vec<PromptPart>) -> Self {
        Self { role: Role::User, parts }
    }

    pub fn assistant(parts: Vec<PromptPart>) -> Self {
        Self { role: Role::Assistant, parts }
    }

    /// Concatenate every text part (newline separated).
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text { text } => Some(text.as_str()),
                PromptPart::File(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        PromptPart::Text { text: text.into() }
    }
}
