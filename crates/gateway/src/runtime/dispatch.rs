//! Routing of webhook events.
//!
//! Message events become turns.  Follow and membership events keep the
//! profile cache fresh for the context enricher and the name resolver.
//! Everything else is acknowledged and ignored.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use mm_domain::chat::GroupProfile;
use mm_domain::error::Result;
use mm_domain::trace::TraceEvent;
use mm_platform::events::{Event, EventKind, Source};

use super::context::TurnContext;
use super::turn::Pipeline;

impl Pipeline {
    /// Handle one webhook event.  Errors are logged, never returned: the
    /// webhook has already been acknowledged.
    pub async fn dispatch(&self, event: Event, cancel: CancellationToken) {
        let Some(source) = event.source.as_ref() else {
            tracing::warn!(kind = event.kind.name(), "event without source, ignored");
            return;
        };

        match &event.kind {
            EventKind::Message { message } => {
                let message_id = message
                    .id()
                    .map(str::to_owned)
                    .or_else(|| event.webhook_event_id.clone())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let ctx = TurnContext::new(cancel)
                    .with_source(source)
                    .with_message_id(message_id)
                    .with_reply_token(event.reply_token.clone())
                    .with_timeout(self.settings().turn_timeout);
                let timestamp =
                    DateTime::<Utc>::from_timestamp_millis(event.timestamp).unwrap_or_else(Utc::now);
                // Failures are logged and traced inside the turn.
                let _ = self.handle_message(&ctx, message, timestamp).await;
            }
            EventKind::Follow => {
                if let Some(user_id) = source.user_id() {
                    if let Err(e) = self.cache_user_profile(user_id).await {
                        tracing::warn!(user_id, error = %e, "follower profile not cached");
                    }
                }
            }
            EventKind::Join | EventKind::MemberJoined { .. } | EventKind::MemberLeft { .. } => {
                if let Source::Group { group_id, .. } = source {
                    if let Err(e) = self.refresh_group(group_id).await {
                        tracing::warn!(group_id = %group_id, error = %e, "group profile not refreshed");
                    }
                } else {
                    tracing::debug!(
                        kind = event.kind.name(),
                        conversation_id = source.conversation_id(),
                        "membership change outside a group, nothing to refresh"
                    );
                }
            }
            EventKind::Unfollow | EventKind::Leave | EventKind::Other => {
                tracing::debug!(kind = event.kind.name(), "event ignored");
            }
        }
    }

    /// Fetch group summary and member count and store them as the cached
    /// [`GroupProfile`].
    pub async fn refresh_group(&self, group_id: &str) -> Result<GroupProfile> {
        let platform = &self.deps().platform;
        let (summary, count) = tokio::join!(
            platform.group_summary(group_id),
            platform.group_member_count(group_id),
        );
        let summary = summary?;
        let member_count = match count {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(group_id, error = %e, "member count unavailable");
                None
            }
        };

        let profile = GroupProfile {
            group_id: summary.group_id,
            name: summary.name,
            picture_url: summary.picture_url,
            member_count,
            updated_at: Utc::now(),
        };
        self.deps().profiles.put_group_profile(profile.clone()).await?;
        TraceEvent::GroupRefreshed {
            group_id: profile.group_id.clone(),
            member_count,
        }
        .emit();
        Ok(profile)
    }

    pub async fn cache_user_profile(&self, user_id: &str) -> Result<()> {
        let profile = self.deps().platform.user_profile(user_id).await?;
        tracing::info!(user_id, display_name = %profile.display_name, "user profile cached");
        self.deps().profiles.put_user_profile(profile).await
    }
}
