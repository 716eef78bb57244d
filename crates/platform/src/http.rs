//! HTTP implementation of [`PlatformClient`] for a LINE-style Messaging API.
//!
//! JSON endpoints live under `api_base_url`; binary message content is
//! served from `data_api_base_url`.  Every call is a single attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use mm_domain::chat::UserProfile;
use mm_domain::config::PlatformConfig;
use mm_domain::error::{Error, Result};

use crate::client::{GroupSummary, MediaContent, PlatformClient};

/// The platform rejects reply texts longer than this (in characters).
const MAX_REPLY_CHARS: usize = 5_000;

/// Loading-indicator bounds accepted by the platform, in seconds.
const MIN_LOADING_SECS: u64 = 5;
const MAX_LOADING_SECS: u64 = 60;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct HttpPlatformClient {
    http: Client,
    api_base_url: String,
    data_api_base_url: String,
    access_token: Option<String>,
}

impl HttpPlatformClient {
    /// Build a client from `[platform]`, reading the channel access token
    /// from the configured environment variable.
    pub fn from_config(cfg: &PlatformConfig) -> Result<Self> {
        let access_token = std::env::var(&cfg.access_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        if access_token.is_none() {
            tracing::warn!(
                env_var = %cfg.access_token_env,
                "channel access token not set, platform calls will be rejected"
            );
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            http,
            api_base_url: cfg.api_base_url.trim_end_matches('/').to_owned(),
            data_api_base_url: cfg.data_api_base_url.trim_end_matches('/').to_owned(),
            access_token,
        })
    }

    // ── request helpers ──────────────────────────────────────────────

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    async fn send(&self, op: &str, rb: RequestBuilder) -> Result<Response> {
        let resp = self.authed(rb).send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::dependency(
            "platform",
            format!("{op}: HTTP {} - {body}", status.as_u16()),
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, op: &str, url: String) -> Result<T> {
        let resp = self.send(op, self.http.get(url)).await?;
        let text = resp.text().await.map_err(transport_error)?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("platform: {e}"))
    } else {
        Error::Http(format!("platform: {e}"))
    }
}

/// Round `timeout` up to the 5-second steps the platform accepts.
fn loading_seconds(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    let stepped = secs.div_ceil(5) * 5;
    stepped.clamp(MIN_LOADING_SECS, MAX_LOADING_SECS)
}

fn truncate_reply(text: &str) -> &str {
    match text.char_indices().nth(MAX_REPLY_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ── Wire shapes ────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupSummaryResponse {
    group_id: String,
    #[serde(default)]
    group_name: Option<String>,
    #[serde(default)]
    picture_url: Option<String>,
}

#[derive(Deserialize)]
struct MemberCountResponse {
    count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    user_id: String,
    display_name: String,
    #[serde(default)]
    picture_url: Option<String>,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn download_media(&self, message_id: &str) -> Result<MediaContent> {
        let url = format!(
            "{}/v2/bot/message/{message_id}/content",
            self.data_api_base_url
        );
        let resp = self.send("download_media", self.http.get(url)).await?;
        let mime_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_owned();
        let bytes = resp.bytes().await.map_err(transport_error)?.to_vec();
        tracing::debug!(message_id, bytes = bytes.len(), mime_type = %mime_type, "media downloaded");
        Ok(MediaContent { bytes, mime_type })
    }

    async fn show_typing(&self, conversation_id: &str, timeout: Duration) -> Result<()> {
        let body = serde_json::json!({
            "chatId": conversation_id,
            "loadingSeconds": loading_seconds(timeout),
        });
        self.send(
            "show_typing",
            self.http.post(self.api("/v2/bot/chat/loading/start")).json(&body),
        )
        .await?;
        Ok(())
    }

    async fn reply(&self, reply_token: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": truncate_reply(text) }],
        });
        self.send(
            "reply",
            self.http.post(self.api("/v2/bot/message/reply")).json(&body),
        )
        .await?;
        Ok(())
    }

    async fn group_summary(&self, group_id: &str) -> Result<GroupSummary> {
        let resp: GroupSummaryResponse = self
            .get_json(
                "group_summary",
                self.api(&format!("/v2/bot/group/{group_id}/summary")),
            )
            .await?;
        Ok(GroupSummary {
            group_id: resp.group_id,
            name: resp.group_name,
            picture_url: resp.picture_url,
        })
    }

    async fn group_member_count(&self, group_id: &str) -> Result<u32> {
        let resp: MemberCountResponse = self
            .get_json(
                "group_member_count",
                self.api(&format!("/v2/bot/group/{group_id}/members/count")),
            )
            .await?;
        Ok(resp.count)
    }

    async fn user_profile(&self, user_id: &str) -> Result<UserProfile> {
        let resp: ProfileResponse = self
            .get_json("user_profile", self.api(&format!("/v2/bot/profile/{user_id}")))
            .await?;
        Ok(UserProfile {
            user_id: resp.user_id,
            display_name: resp.display_name,
            picture_url: resp.picture_url,
            status_message: resp.status_message,
            language: resp.language,
        })
    }
}
