//! Event normalization: platform message content into a [`UserMessage`].
//!
//! Text keeps its literal content.  Images are downloaded and persisted
//! to the media store so later turns can reference them by storage key;
//! any failure on that path degrades to a text surrogate.  Every other
//! kind becomes a fixed placeholder.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use mm_domain::error::Result;
use mm_domain::history::{FileData, Part, UserMessage};
use mm_domain::trace::TraceEvent;
use mm_platform::events::MessageContent;
use mm_platform::PlatformClient;
use mm_store::MediaStore;

use super::context::TurnContext;

pub const STICKER_PLACEHOLDER: &str = "[User sent a sticker]";
pub const VIDEO_PLACEHOLDER: &str = "[User sent a video]";
pub const AUDIO_PLACEHOLDER: &str = "[User sent an audio message]";
pub const LOCATION_PLACEHOLDER: &str = "[User sent a location]";
pub const FILE_PLACEHOLDER: &str = "[User sent a file]";
pub const UNSUPPORTED_PLACEHOLDER: &str = "[User sent an unsupported message]";
pub const IMAGE_ERROR_PLACEHOLDER: &str =
    "[User sent an image, but an error occurred while loading]";

pub struct Normalizer {
    platform: Arc<dyn PlatformClient>,
    media: Arc<dyn MediaStore>,
}

impl Normalizer {
    pub fn new(platform: Arc<dyn PlatformClient>, media: Arc<dyn MediaStore>) -> Self {
        Self { platform, media }
    }

    /// Build the user message for `content`.
    ///
    /// Fails only when the context lacks the conversation, user or
    /// message id.
    pub async fn normalize(
        &self,
        ctx: &TurnContext,
        content: &MessageContent,
        timestamp: DateTime<Utc>,
    ) -> Result<UserMessage> {
        let conversation_id = ctx.conversation_id()?;
        let user_id = ctx.user_id()?;
        let message_id = ctx.message_id()?;

        let part = match content {
            MessageContent::Text { text, .. } => Part::text(text.as_str()),
            MessageContent::Image { .. } => {
                self.materialize_image(conversation_id, message_id).await
            }
            MessageContent::Sticker { .. } => Part::text(STICKER_PLACEHOLDER),
            MessageContent::Video { .. } => Part::text(VIDEO_PLACEHOLDER),
            MessageContent::Audio { .. } => Part::text(AUDIO_PLACEHOLDER),
            MessageContent::Location { .. } => Part::text(LOCATION_PLACEHOLDER),
            MessageContent::File { .. } => Part::text(FILE_PLACEHOLDER),
            MessageContent::Unsupported => Part::text(UNSUPPORTED_PLACEHOLDER),
        };

        TraceEvent::EventNormalized {
            conversation_id: conversation_id.to_owned(),
            message_id: message_id.to_owned(),
            kind: content.kind().to_owned(),
            parts: 1,
        }
        .emit();

        Ok(UserMessage {
            message_id: message_id.to_owned(),
            user_id: user_id.to_owned(),
            timestamp,
            parts: vec![part],
        })
    }

    async fn materialize_image(&self, conversation_id: &str, message_id: &str) -> Part {
        let media = match self.platform.download_media(message_id).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(message_id, error = %e, "image download failed");
                return Part::text(IMAGE_ERROR_PLACEHOLDER);
            }
        };

        let mime_type = media.mime_type;
        match self
            .media
            .store(conversation_id, message_id, media.bytes, &mime_type)
            .await
        {
            Ok(storage_key) => Part::FileData(FileData {
                storage_key,
                mime_type,
                display_name: None,
                video_metadata: None,
            }),
            Err(e) => {
                tracing::warn!(message_id, error = %e, "image store failed");
                Part::text(IMAGE_ERROR_PLACEHOLDER)
            }
        }
    }
}
