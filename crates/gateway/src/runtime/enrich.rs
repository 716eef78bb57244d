//! Context preamble: local time, chat population and the sender's profile.
//!
//! Both lookups are best effort.  A missing group count is omitted from
//! the preamble and a missing profile drops the profile block; neither
//! fails the turn.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use mm_domain::chat::{ChatType, UserProfile};
use mm_domain::prompt::{FileRef, PromptPart};
use mm_store::ProfileStore;

/// MIME type assumed for avatar URLs; the platform serves JPEG.
const AVATAR_MIME: &str = "image/jpeg";

pub struct ContextEnricher {
    profiles: Arc<dyn ProfileStore>,
    timezone: Tz,
}

impl ContextEnricher {
    pub fn new(profiles: Arc<dyn ProfileStore>, timezone: Tz) -> Self {
        Self { profiles, timezone }
    }

    /// Build the ordered context parts for one turn.
    pub async fn enrich(
        &self,
        chat_type: ChatType,
        conversation_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<PromptPart> {
        let member_count = async {
            if chat_type != ChatType::Group {
                return None;
            }
            match self.profiles.group_profile(conversation_id).await {
                Ok(group) => group.member_count,
                Err(e) => {
                    tracing::debug!(conversation_id, error = %e, "group profile unavailable");
                    None
                }
            }
        };
        let profile = async {
            match self.profiles.user_profile(user_id).await {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::debug!(user_id, error = %e, "user profile unavailable");
                    None
                }
            }
        };
        let (member_count, profile) = tokio::join!(member_count, profile);

        let mut parts = vec![PromptPart::text(self.preamble(chat_type, member_count, now))];
        if let Some(profile) = profile {
            parts.push(PromptPart::text(profile_block(&profile)));
            if let Some(url) = profile.picture_url {
                parts.push(PromptPart::File(FileRef {
                    uri: Some(url),
                    mime_type: AVATAR_MIME.into(),
                    display_name: Some(format!("{} avatar", profile.display_name)),
                    video_metadata: None,
                }));
            }
        }
        parts
    }

    fn preamble(&self, chat_type: ChatType, member_count: Option<u32>, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.timezone);
        let mut out = format!(
            "Current time: {} ({})\nChat type: {}",
            local.format("%Y-%m-%d %H:%M (%A)"),
            self.timezone.name(),
            describe_chat(chat_type),
        );
        if let Some(count) = member_count {
            out.push_str(&format!("\nGroup members: {count}"));
        }
        out
    }
}

fn describe_chat(chat_type: ChatType) -> &'static str {
    match chat_type {
        ChatType::OneToOne => "one-to-one",
        ChatType::Group => "group",
        ChatType::Room => "multi-person room",
    }
}

fn profile_block(profile: &UserProfile) -> String {
    let mut out = format!("User profile:\nName: {}", profile.display_name);
    if let Some(status) = &profile.status_message {
        out.push_str(&format!("\nStatus message: {status}"));
    }
    if let Some(lang) = &profile.language {
        out.push_str(&format!("\nLanguage: {lang}"));
    }
    out
}
