//! Delayed "typing" indicator.
//!
//! Arming spawns a detached task that races the configured delay against
//! the turn completing and the turn context finishing.  Only when the
//! delay wins does it call the platform, once.  The turn never awaits the
//! task; failures and panics inside it are logged and stay there.
//!
//! ```text
//! Idle ──arm (one-to-one)──▶ Armed ──delay elapsed──▶ Fired
//!                              └──complete / ctx done──▶ Cancelled
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use mm_domain::chat::ChatType;
use mm_domain::trace::TraceEvent;
use mm_platform::PlatformClient;

use super::context::TurnContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Idle,
    Armed,
    Fired,
    Cancelled,
}

pub struct IndicatorScheduler {
    platform: Arc<dyn PlatformClient>,
    delay: Duration,
    timeout: Duration,
}

impl IndicatorScheduler {
    pub fn new(platform: Arc<dyn PlatformClient>, delay: Duration, timeout: Duration) -> Self {
        Self {
            platform,
            delay,
            timeout,
        }
    }

    /// Start the timer for a turn.  Chats other than one-to-one, and
    /// contexts without a conversation, get an idle handle.
    pub fn arm(&self, ctx: &TurnContext) -> IndicatorHandle {
        let completed = CancellationToken::new();
        let state = Arc::new(Mutex::new(IndicatorState::Idle));

        let conversation_id = match (ctx.chat_type(), ctx.conversation_id()) {
            (Ok(ChatType::OneToOne), Ok(id)) => id.to_owned(),
            _ => {
                return IndicatorHandle {
                    completed,
                    state,
                    task: None,
                }
            }
        };
        *state.lock() = IndicatorState::Armed;

        let fut = run_timer(
            self.platform.clone(),
            ctx.clone(),
            completed.clone(),
            state.clone(),
            conversation_id,
            self.delay,
            self.timeout,
        );
        let task_state = state.clone();
        let task = tokio::spawn(
            async move {
                if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                    tracing::error!("typing indicator task panicked");
                    let mut s = task_state.lock();
                    if *s == IndicatorState::Armed {
                        *s = IndicatorState::Cancelled;
                    }
                }
            }
            .in_current_span(),
        );

        IndicatorHandle {
            completed,
            state,
            task: Some(task),
        }
    }
}

async fn run_timer(
    platform: Arc<dyn PlatformClient>,
    ctx: TurnContext,
    completed: CancellationToken,
    state: Arc<Mutex<IndicatorState>>,
    conversation_id: String,
    delay: Duration,
    timeout: Duration,
) {
    tokio::select! {
        biased;
        _ = ctx.done() => {
            *state.lock() = IndicatorState::Cancelled;
            return;
        }
        _ = completed.cancelled() => {
            *state.lock() = IndicatorState::Cancelled;
            return;
        }
        _ = tokio::time::sleep(delay) => {}
    }

    *state.lock() = IndicatorState::Fired;
    let result = tokio::select! {
        biased;
        _ = ctx.done() => None,
        res = platform.show_typing(&conversation_id, timeout) => Some(res),
    };

    match result {
        Some(Ok(())) => {}
        Some(Err(ref e)) => {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "show typing failed");
        }
        None => {
            tracing::debug!(conversation_id = %conversation_id, "turn finished during show typing, result discarded");
        }
    }
    TraceEvent::IndicatorFired {
        conversation_id,
        delay_ms: delay.as_millis() as u64,
        ok: matches!(result, Some(Ok(()))),
    }
    .emit();
}

/// Owned by the turn.  Completing (or dropping) it cancels a pending
/// timer; an indicator call already in flight is left to finish.
pub struct IndicatorHandle {
    completed: CancellationToken,
    state: Arc<Mutex<IndicatorState>>,
    task: Option<JoinHandle<()>>,
}

impl IndicatorHandle {
    pub fn complete(&self) {
        self.completed.cancel();
    }

    pub fn state(&self) -> IndicatorState {
        *self.state.lock()
    }

    /// Wait for the background task to exit and report where it ended.
    pub async fn settle(mut self) -> IndicatorState {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state()
    }
}

impl Drop for IndicatorHandle {
    fn drop(&mut self) {
        self.completed.cancel();
    }
}
