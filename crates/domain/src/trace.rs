use serde::Serialize;

/// Structured trace events emitted across all murmur crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    EventNormalized {
        conversation_id: String,
        message_id: String,
        kind: String,
        parts: usize,
    },
    HistorySaved {
        conversation_id: String,
        messages: usize,
        generation: u64,
    },
    HistoryConflict {
        conversation_id: String,
        expected: u64,
        actual: u64,
    },
    IndicatorFired {
        conversation_id: String,
        delay_ms: u64,
        ok: bool,
    },
    MediaResolved {
        keys: usize,
        failed: usize,
        duration_ms: u64,
    },
    GenerationCompleted {
        provider: String,
        model: String,
        conversation_id: String,
        prompt_messages: usize,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    TurnFailed {
        conversation_id: String,
        error: String,
    },
    GroupRefreshed {
        group_id: String,
        member_count: Option<u32>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "mm_event");
    }
}
