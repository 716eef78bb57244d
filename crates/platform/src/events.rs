//! Webhook payload types.
//!
//! Only the fields murmur acts on are modelled.  Unknown event and
//! message types deserialize into catch-all variants so a new platform
//! feature never makes the whole payload unreadable.  An event that does
//! not decode is skipped on its own; the rest of the batch is kept.

use serde::{Deserialize, Deserializer};

use mm_domain::chat::ChatType;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// Bot user id the events were sent to.
    #[serde(default)]
    pub destination: String,
    #[serde(default, deserialize_with = "each_event")]
    pub events: Vec<Event>,
}

fn each_event<'de, D>(deserializer: D) -> Result<Vec<Event>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<Event>(value) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping malformed webhook event");
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub webhook_event_id: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventKind {
    Message { message: MessageContent },
    Follow,
    Unfollow,
    Join,
    Leave,
    MemberJoined { joined: Members },
    MemberLeft { left: Members },
    #[serde(other)]
    Other,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Message { .. } => "message",
            EventKind::Follow => "follow",
            EventKind::Unfollow => "unfollow",
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::MemberJoined { .. } => "memberJoined",
            EventKind::MemberLeft { .. } => "memberLeft",
            EventKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Members {
    #[serde(default)]
    pub members: Vec<Source>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message content
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        id: String,
        text: String,
    },
    Image {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    Video {
        id: String,
        /// Milliseconds.
        #[serde(default)]
        duration: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Audio {
        id: String,
        #[serde(default)]
        duration: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    File {
        id: String,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        file_size: Option<u64>,
    },
    Location {
        id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        address: Option<String>,
        latitude: f64,
        longitude: f64,
    },
    #[serde(rename_all = "camelCase")]
    Sticker {
        id: String,
        package_id: String,
        sticker_id: String,
    },
    #[serde(other)]
    Unsupported,
}

impl MessageContent {
    /// Platform message id, absent only for unsupported kinds.
    pub fn id(&self) -> Option<&str> {
        match self {
            MessageContent::Text { id, .. }
            | MessageContent::Image { id }
            | MessageContent::Video { id, .. }
            | MessageContent::Audio { id, .. }
            | MessageContent::File { id, .. }
            | MessageContent::Location { id, .. }
            | MessageContent::Sticker { id, .. } => Some(id),
            MessageContent::Unsupported => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::Text { .. } => "text",
            MessageContent::Image { .. } => "image",
            MessageContent::Video { .. } => "video",
            MessageContent::Audio { .. } => "audio",
            MessageContent::File { .. } => "file",
            MessageContent::Location { .. } => "location",
            MessageContent::Sticker { .. } => "sticker",
            MessageContent::Unsupported => "unsupported",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event source
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    #[serde(rename_all = "camelCase")]
    User { user_id: String },
    #[serde(rename_all = "camelCase")]
    Group {
        group_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Room {
        room_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },
}

impl Source {
    /// The conversation this source belongs to: the user for one-to-one
    /// chats, otherwise the group or room.
    pub fn conversation_id(&self) -> &str {
        match self {
            Source::User { user_id } => user_id,
            Source::Group { group_id, .. } => group_id,
            Source::Room { room_id, .. } => room_id,
        }
    }

    pub fn chat_type(&self) -> ChatType {
        match self {
            Source::User { .. } => ChatType::OneToOne,
            Source::Group { .. } => ChatType::Group,
            Source::Room { .. } => ChatType::Room,
        }
    }

    /// The sending user, when the platform disclosed it.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Source::User { user_id } => Some(user_id),
            Source::Group { user_id, .. } | Source::Room { user_id, .. } => user_id.as_deref(),
        }
    }
}
