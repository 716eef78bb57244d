use std::time::Duration;

use mm_domain::chat::UserProfile;
use mm_domain::error::Result;

/// Raw media bytes downloaded from the platform.
#[derive(Debug, Clone)]
pub struct MediaContent {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub group_id: String,
    pub name: Option<String>,
    pub picture_url: Option<String>,
}

/// Outbound calls to the messaging platform.
///
/// Implementations are stateless wrappers over the platform API; they do
/// not retry.  Callers decide whether a failure is fatal.
#[async_trait::async_trait]
pub trait PlatformClient: Send + Sync {
    /// Download the binary content attached to a message.
    async fn download_media(&self, message_id: &str) -> Result<MediaContent>;

    /// Show the "typing" indicator in a one-to-one chat for `timeout`.
    async fn show_typing(&self, conversation_id: &str, timeout: Duration) -> Result<()>;

    /// Answer an event using its single-use reply token.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()>;

    async fn group_summary(&self, group_id: &str) -> Result<GroupSummary>;

    async fn group_member_count(&self, group_id: &str) -> Result<u32>;

    async fn user_profile(&self, user_id: &str) -> Result<UserProfile>;
}
