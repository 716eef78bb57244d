use mm_domain::error::Result;
use mm_domain::prompt::PromptMessage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// The ordered conversation: context preamble first, then history.
    pub messages: Vec<PromptMessage>,
}

/// A provider-agnostic generation response.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// Textual content of the reply.
    pub text: String,
    /// Token usage information.
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    /// The reason the model stopped generating (e.g. "stop", "length").
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The generative-text backend.
///
/// Retries and backoff, if any, belong to the implementation; the
/// pipeline treats any error as fatal for the turn.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply for the ordered messages.
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
