//! Request-scoped context for one turn.
//!
//! A `TurnContext` carries the turn's cancellation signal, its optional
//! deadline and the identifiers the pipeline needs.  Required identifiers
//! are exposed through accessors that fail with `ContextMissing`, so a
//! wiring defect surfaces as an error instead of a silently empty id.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use mm_domain::chat::ChatType;
use mm_domain::error::{Error, Result};
use mm_platform::events::Source;

#[derive(Debug, Clone)]
pub struct TurnContext {
    turn_id: String,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    conversation_id: Option<String>,
    chat_type: Option<ChatType>,
    user_id: Option<String>,
    message_id: Option<String>,
    reply_token: Option<String>,
}

impl TurnContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            turn_id: uuid::Uuid::new_v4().to_string(),
            cancel,
            deadline: None,
            conversation_id: None,
            chat_type: None,
            user_id: None,
            message_id: None,
            reply_token: None,
        }
    }

    // ── builders ─────────────────────────────────────────────────────

    /// Take conversation id, chat type and (when disclosed) user id from
    /// the event source.
    pub fn with_source(mut self, source: &Source) -> Self {
        self.conversation_id = Some(source.conversation_id().to_owned());
        self.chat_type = Some(source.chat_type());
        self.user_id = source.user_id().map(str::to_owned);
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>, chat_type: ChatType) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self.chat_type = Some(chat_type);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_reply_token(mut self, reply_token: Option<String>) -> Self {
        self.reply_token = reply_token;
        self
    }

    /// Abort the turn once `timeout` has elapsed from now.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|t| Instant::now() + t);
        self
    }

    // ── accessors ────────────────────────────────────────────────────

    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    pub fn conversation_id(&self) -> Result<&str> {
        self.conversation_id
            .as_deref()
            .ok_or(Error::ContextMissing("conversation id"))
    }

    pub fn chat_type(&self) -> Result<ChatType> {
        self.chat_type.ok_or(Error::ContextMissing("chat type"))
    }

    pub fn user_id(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or(Error::ContextMissing("user id"))
    }

    pub fn message_id(&self) -> Result<&str> {
        self.message_id
            .as_deref()
            .ok_or(Error::ContextMissing("message id"))
    }

    pub fn reply_token(&self) -> Option<&str> {
        self.reply_token.as_deref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // ── cancellation ─────────────────────────────────────────────────

    /// Resolves once the turn is cancelled or its deadline has passed.
    pub async fn done(&self) {
        match self.deadline {
            Some(at) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(at) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }

    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    /// Drive `fut` to completion unless the context finishes first.
    ///
    /// Cancellation wins over a result that becomes ready in the same
    /// poll.
    pub async fn run<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.done() => Err(Error::Cancelled),
            res = fut => res,
        }
    }
}
