//! The persisted Message Log of a conversation.
//!
//! These shapes are the serialization contract for whatever store encodes
//! the log: tags, part order and field values must survive a round trip.
//! Signed URLs are never part of this model; see [`crate::prompt`] for the
//! request-scoped view handed to the backend.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the Message Log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub message_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub parts: Vec<Part>,
}

/// Atomic content unit within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    /// Deferred media reference; needs a signed URL at read time.
    FileData(FileData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub storage_key: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_metadata: Option<VideoMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_offset_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_offset_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }
}

impl Message {
    pub fn parts(&self) -> &[Part] {
        match self {
            Message::User(m) => &m.parts,
            Message::Assistant(m) => &m.parts,
        }
    }
}

/// Optimistic-concurrency marker for a conversation's Message Log.
///
/// `Generation::NONE` means "no log stored yet"; every successful save
/// advances the generation by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    pub const NONE: Generation = Generation(0);

    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
