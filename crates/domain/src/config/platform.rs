use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messaging platform
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for the messaging platform's bot API.
///
/// Secrets are never stored in the file itself; the config names the
/// environment variables that hold them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL for JSON endpoints (reply, profiles, group metadata,
    /// loading indicator).
    #[serde(default = "d_api_base_url")]
    pub api_base_url: String,
    /// Base URL for binary content downloads.
    #[serde(default = "d_data_api_base_url")]
    pub data_api_base_url: String,
    /// Environment variable holding the channel access token.
    #[serde(default = "d_access_token_env")]
    pub access_token_env: String,
    /// Environment variable holding the channel secret used to verify
    /// webhook signatures.  When unset, signatures are not checked.
    #[serde(default = "d_channel_secret_env")]
    pub channel_secret_env: String,
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base_url: d_api_base_url(),
            data_api_base_url: d_data_api_base_url(),
            access_token_env: d_access_token_env(),
            channel_secret_env: d_channel_secret_env(),
            request_timeout_secs: d_request_timeout_secs(),
        }
    }
}

fn d_api_base_url() -> String {
    "https://api.line.me".into()
}

fn d_data_api_base_url() -> String {
    "https://api-data.line.me".into()
}

fn d_access_token_env() -> String {
    "MM_CHANNEL_ACCESS_TOKEN".into()
}

fn d_channel_secret_env() -> String {
    "MM_CHANNEL_SECRET".into()
}

fn d_request_timeout_secs() -> u64 {
    30
}
