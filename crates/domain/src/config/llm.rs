use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generative backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// OpenAI-compatible chat completions endpoint used to generate replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider id reported in logs and trace events.
    #[serde(default = "d_provider_id")]
    pub provider_id: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Prepended as a system message on every request.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_id: d_provider_id(),
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            model: d_model(),
            temperature: None,
            max_tokens: None,
            system_prompt: None,
            request_timeout_secs: d_request_timeout_secs(),
        }
    }
}

fn d_provider_id() -> String {
    "openai".into()
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn d_model() -> String {
    "gpt-4o".into()
}

fn d_request_timeout_secs() -> u64 {
    120
}
