//! The pipeline orchestrator.
//!
//! One call to [`Pipeline::handle_message`] is one turn:
//!
//! 1. normalize the inbound message
//! 2. arm the delayed indicator
//! 3. load the Message Log, append, save with the loaded generation
//! 4. enrich context and convert history concurrently
//! 5. generate
//! 6. complete the indicator
//!
//! Steps 1-6 run under the turn context; cancellation or the deadline
//! aborts them with `Error::Cancelled`.  Reply delivery and reply
//! persistence follow a successful turn and only log their failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::Instrument;

use mm_domain::config::Config;
use mm_domain::error::{Error, Result};
use mm_domain::history::{AssistantMessage, Generation, Message, Part};
use mm_domain::prompt::PromptMessage;
use mm_domain::trace::TraceEvent;
use mm_platform::events::MessageContent;
use mm_platform::PlatformClient;
use mm_providers::{GenerateRequest, TextGenerator};
use mm_store::{HistoryStore, MediaStore, ProfileStore};

use super::context::TurnContext;
use super::convert::{HistoryConverter, ProfileNames};
use super::enrich::ContextEnricher;
use super::indicator::{IndicatorHandle, IndicatorScheduler};
use super::normalize::Normalizer;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared collaborators.  Built once per process and never mutated.
#[derive(Clone)]
pub struct Collaborators {
    pub platform: Arc<dyn PlatformClient>,
    pub generator: Arc<dyn TextGenerator>,
    pub history: Arc<dyn HistoryStore>,
    pub media: Arc<dyn MediaStore>,
    pub profiles: Arc<dyn ProfileStore>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub timezone: Tz,
    pub indicator_delay: Duration,
    pub indicator_timeout: Duration,
    pub signed_url_ttl: Duration,
    pub turn_timeout: Option<Duration>,
    pub deliver_reply: bool,
    pub persist_reply: bool,
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            timezone: cfg.pipeline.timezone()?,
            indicator_delay: cfg.pipeline.indicator_delay(),
            indicator_timeout: cfg.pipeline.indicator_timeout(),
            signed_url_ttl: Duration::from_secs(cfg.storage.signed_url_ttl_secs),
            turn_timeout: cfg.pipeline.turn_timeout(),
            deliver_reply: cfg.pipeline.deliver_reply,
            persist_reply: cfg.pipeline.persist_reply,
        })
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            indicator_delay: Duration::from_secs(3),
            indicator_timeout: Duration::from_secs(20),
            signed_url_ttl: Duration::from_secs(900),
            turn_timeout: Some(Duration::from_secs(120)),
            deliver_reply: true,
            persist_reply: false,
        }
    }
}

/// Result of a successful turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    /// Generation after the last save of this turn.
    pub generation: Generation,
    pub delivered: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Pipeline {
    deps: Collaborators,
    settings: PipelineSettings,
    normalizer: Normalizer,
    enricher: ContextEnricher,
    converter: HistoryConverter,
    indicator: IndicatorScheduler,
}

/// What the core steps hand to the post-turn steps.
struct CoreResult {
    reply: String,
    log: Vec<Message>,
    generation: Generation,
}

impl Pipeline {
    pub fn new(deps: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            normalizer: Normalizer::new(deps.platform.clone(), deps.media.clone()),
            enricher: ContextEnricher::new(deps.profiles.clone(), settings.timezone),
            converter: HistoryConverter::new(
                deps.media.clone(),
                settings.signed_url_ttl,
                settings.timezone,
            ),
            indicator: IndicatorScheduler::new(
                deps.platform.clone(),
                settings.indicator_delay,
                settings.indicator_timeout,
            ),
            deps,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub(crate) fn deps(&self) -> &Collaborators {
        &self.deps
    }

    /// Run one turn for an inbound message.
    pub async fn handle_message(
        &self,
        ctx: &TurnContext,
        content: &MessageContent,
        timestamp: DateTime<Utc>,
    ) -> Result<TurnOutcome> {
        let conversation_id = ctx.conversation_id()?.to_owned();
        let span = tracing::info_span!(
            "turn",
            turn_id = %ctx.turn_id(),
            conversation_id = %conversation_id,
            kind = content.kind(),
        );

        async {
            let started = Instant::now();
            let core = match ctx.run(self.run_core(ctx, content, timestamp)).await {
                Ok(core) => core,
                Err(e) => {
                    if let Error::Conflict { expected, actual, .. } = &e {
                        TraceEvent::HistoryConflict {
                            conversation_id: conversation_id.clone(),
                            expected: *expected,
                            actual: *actual,
                        }
                        .emit();
                    }
                    tracing::error!(error = %e, "turn failed");
                    TraceEvent::TurnFailed {
                        conversation_id: conversation_id.clone(),
                        error: e.to_string(),
                    }
                    .emit();
                    return Err(e);
                }
            };
            tracing::info!(
                duration_ms = started.elapsed().as_millis() as u64,
                reply_chars = core.reply.chars().count(),
                "turn completed"
            );

            let delivered = self.deliver(ctx, &core.reply).await;
            let generation = self.persist(&conversation_id, core.log, core.generation, &core.reply).await;

            Ok(TurnOutcome {
                reply: core.reply,
                generation,
                delivered,
            })
        }
        .instrument(span)
        .await
    }

    async fn run_core(
        &self,
        ctx: &TurnContext,
        content: &MessageContent,
        timestamp: DateTime<Utc>,
    ) -> Result<CoreResult> {
        let conversation_id = ctx.conversation_id()?;
        let chat_type = ctx.chat_type()?;
        let user_id = ctx.user_id()?;

        let user_message = self.normalizer.normalize(ctx, content, timestamp).await?;
        let indicator: IndicatorHandle = self.indicator.arm(ctx);

        // ── Durably record the user's message before generating ──────
        let (mut log, loaded) = self.deps.history.load(conversation_id).await?;
        log.push(Message::User(user_message));
        let generation = self.deps.history.save(conversation_id, &log, loaded).await?;
        TraceEvent::HistorySaved {
            conversation_id: conversation_id.to_owned(),
            messages: log.len(),
            generation: generation.0,
        }
        .emit();

        // ── Enrich + convert in parallel ─────────────────────────────
        let names = ProfileNames::new(self.deps.profiles.clone());
        let (context_parts, history) = tokio::join!(
            self.enricher.enrich(chat_type, conversation_id, user_id, Utc::now()),
            self.converter.convert(&log, &names),
        );
        let history = history?;

        let mut messages = Vec::with_capacity(history.len() + 1);
        if !context_parts.is_empty() {
            messages.push(PromptMessage::user(context_parts));
        }
        messages.extend(history);

        // ── Generate ─────────────────────────────────────────────────
        let prompt_messages = messages.len();
        let started = Instant::now();
        let response = self
            .deps
            .generator
            .generate(GenerateRequest { messages })
            .await?;
        TraceEvent::GenerationCompleted {
            provider: self.deps.generator.provider_id().to_owned(),
            model: response.model.clone(),
            conversation_id: conversation_id.to_owned(),
            prompt_messages,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: response.usage.map(|u| u.prompt_tokens),
            completion_tokens: response.usage.map(|u| u.completion_tokens),
        }
        .emit();

        indicator.complete();
        Ok(CoreResult {
            reply: response.text,
            log,
            generation,
        })
    }

    // ── Post-turn steps ──────────────────────────────────────────────

    async fn deliver(&self, ctx: &TurnContext, reply: &str) -> bool {
        if !self.settings.deliver_reply {
            return false;
        }
        if reply.trim().is_empty() {
            tracing::warn!("empty reply, nothing to deliver");
            return false;
        }
        let Some(token) = ctx.reply_token() else {
            tracing::debug!("no reply token, reply not delivered");
            return false;
        };
        match self.deps.platform.reply(token, reply).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "reply delivery failed");
                false
            }
        }
    }

    async fn persist(
        &self,
        conversation_id: &str,
        mut log: Vec<Message>,
        generation: Generation,
        reply: &str,
    ) -> Generation {
        if !self.settings.persist_reply {
            return generation;
        }
        log.push(Message::Assistant(AssistantMessage {
            parts: vec![Part::text(reply)],
        }));
        match self.deps.history.save(conversation_id, &log, generation).await {
            Ok(next) => {
                TraceEvent::HistorySaved {
                    conversation_id: conversation_id.to_owned(),
                    messages: log.len(),
                    generation: next.0,
                }
                .emit();
                next
            }
            Err(e) => {
                tracing::warn!(error = %e, "reply not persisted");
                generation
            }
        }
    }
}
