use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Durable storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for history logs, media and profile records.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// Environment variable holding the HMAC key for signed media URLs.
    /// When unset, a random per-process key is generated at startup.
    #[serde(default = "d_signing_secret_env")]
    pub signing_secret_env: String,
    #[serde(default = "d_signed_url_ttl_secs")]
    pub signed_url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            signing_secret_env: d_signing_secret_env(),
            signed_url_ttl_secs: d_signed_url_ttl_secs(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}

fn d_signing_secret_env() -> String {
    "MM_MEDIA_SIGNING_SECRET".into()
}

fn d_signed_url_ttl_secs() -> u64 {
    900
}
