//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat completions contract.  Image
//! parts are sent as `image_url` content; other media is described in
//! text since the chat completions contract has no generic file part.

use std::time::{Duration, Instant};

use mm_domain::config::LlmConfig;
use mm_domain::error::{Error, Result};
use mm_domain::prompt::{FileRef, PromptMessage, PromptPart, Role};
use serde_json::Value;

use crate::traits::{GenerateRequest, GenerateResponse, TextGenerator, Usage};
use crate::util::transport_error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from the `[llm]` config section.
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env`.  A missing key is allowed (local servers such as
    /// Ollama need none) but logged.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env_var = %cfg.api_key_env,
                "LLM API key not set, sending unauthenticated requests"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            id: cfg.provider_id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            system_prompt: cfg.system_prompt.clone(),
            client,
        })
    }

    // ── Internal: build authenticated request builder ──────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    // ── Internal: build the JSON body ─────────────────────────────

    fn build_chat_body(&self, req: &GenerateRequest) -> Value {
        let mut messages: Vec<Value> = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = &self.system_prompt {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }
        messages.extend(req.messages.iter().map(msg_to_openai));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if let Some(temp) = self.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn msg_to_openai(msg: &PromptMessage) -> Value {
    match msg.role {
        // Assistant turns only carry text on this wire format.
        Role::Assistant => serde_json::json!({
            "role": "assistant",
            "content": msg.text(),
        }),
        Role::User => {
            let parts: Vec<Value> = msg.parts.iter().map(part_to_openai).collect();
            serde_json::json!({
                "role": role_to_str(msg.role),
                "content": parts,
            })
        }
    }
}

fn part_to_openai(part: &PromptPart) -> Value {
    match part {
        PromptPart::Text { text } => serde_json::json!({"type": "text", "text": text}),
        PromptPart::File(file) => file_to_openai(file),
    }
}

fn file_to_openai(file: &FileRef) -> Value {
    let uri = file.uri.as_deref().unwrap_or_default();
    if file.mime_type.starts_with("image/") {
        return serde_json::json!({
            "type": "image_url",
            "image_url": { "url": uri },
        });
    }
    let name = file.display_name.as_deref().unwrap_or("attachment");
    serde_json::json!({
        "type": "text",
        "text": format!("[{name} ({}): {uri}]", file.mime_type),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider: &str, body: &Value) -> Result<GenerateResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::dependency("llm", format!("{provider}: no choices in response")))?;

    let message = choice
        .get("message")
        .ok_or_else(|| Error::dependency("llm", format!("{provider}: no message in choice")))?;

    let text = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(GenerateResponse {
        text,
        usage,
        model,
        finish_reason,
    })
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl TextGenerator for OpenAiCompatProvider {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&req);
        let started = Instant::now();

        tracing::debug!(
            provider = %self.id,
            url = %url,
            messages = req.messages.len(),
            "openai_compat chat request"
        );

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(Error::dependency(
                "llm",
                format!("{}: HTTP {} - {}", self.id, status.as_u16(), resp_text),
            ));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        let response = parse_chat_response(&self.id, &resp_json)?;
        tracing::debug!(
            provider = %self.id,
            model = %response.model,
            duration_ms = started.elapsed().as_millis() as u64,
            "openai_compat chat response"
        );
        Ok(response)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
