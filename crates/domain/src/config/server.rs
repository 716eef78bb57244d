use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_3210")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Externally reachable origin of this server.  Signed media URLs
    /// handed to the backend are built from it, so the backend must be
    /// able to fetch `{public_base_url}/media/...`.
    #[serde(default = "d_public_base_url")]
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_3210(),
            host: d_host(),
            public_base_url: d_public_base_url(),
        }
    }
}

fn d_3210() -> u16 {
    3210
}

fn d_host() -> String {
    "127.0.0.1".into()
}

fn d_public_base_url() -> String {
    "http://127.0.0.1:3210".into()
}
