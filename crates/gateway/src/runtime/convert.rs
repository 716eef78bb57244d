//! Message Log to backend prompt conversion.
//!
//! One pass emits every message in log order.  File parts are emitted
//! immediately with an empty URI and their position recorded against the
//! storage key; user headers are recorded against the user id.  Then all
//! distinct display names and all distinct signed URLs are resolved
//! concurrently and written back in place.  A single failed URL fails the
//! whole conversion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures_util::future::join_all;

use mm_domain::error::{Error, Result};
use mm_domain::history::{Message, Part};
use mm_domain::prompt::{FileRef, PromptMessage, PromptPart};
use mm_domain::trace::TraceEvent;
use mm_store::{MediaStore, ProfileStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Display-name resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maps a user id to the name shown in message headers.  Infallible:
/// implementations fall back to something printable.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn display_name(&self, user_id: &str) -> String;
}

/// Resolves names from cached profiles, falling back to the raw id.
pub struct ProfileNames {
    profiles: Arc<dyn ProfileStore>,
}

impl ProfileNames {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl NameResolver for ProfileNames {
    async fn display_name(&self, user_id: &str) -> String {
        match self.profiles.user_profile(user_id).await {
            Ok(p) if !p.display_name.trim().is_empty() => p.display_name,
            Ok(_) => user_id.to_owned(),
            Err(e) => {
                tracing::debug!(user_id, error = %e, "display name unavailable");
                user_id.to_owned()
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Converter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HistoryConverter {
    media: Arc<dyn MediaStore>,
    url_ttl: Duration,
    timezone: Tz,
}

/// Slot of a part inside the emitted prompt: (message index, part index).
type Slot = (usize, usize);

impl HistoryConverter {
    pub fn new(media: Arc<dyn MediaStore>, url_ttl: Duration, timezone: Tz) -> Self {
        Self {
            media,
            url_ttl,
            timezone,
        }
    }

    pub async fn convert(
        &self,
        log: &[Message],
        names: &dyn NameResolver,
    ) -> Result<Vec<PromptMessage>> {
        let mut out = Vec::with_capacity(log.len());
        // user id -> (message index, timestamp) of every header to fill
        let mut headers: HashMap<&str, Vec<(usize, DateTime<Utc>)>> = HashMap::new();
        let mut pending: HashMap<&str, Vec<Slot>> = HashMap::new();

        for (idx, message) in log.iter().enumerate() {
            let mut parts = Vec::with_capacity(message.parts().len() + 1);
            if let Message::User(m) = message {
                headers
                    .entry(m.user_id.as_str())
                    .or_default()
                    .push((idx, m.timestamp));
                // Filled in once the name is known.
                parts.push(PromptPart::text(String::new()));
            }
            for part in message.parts() {
                match part {
                    Part::Text { text } => parts.push(PromptPart::text(text.as_str())),
                    Part::FileData(fd) => {
                        pending
                            .entry(fd.storage_key.as_str())
                            .or_default()
                            .push((idx, parts.len()));
                        parts.push(PromptPart::File(FileRef {
                            uri: None,
                            mime_type: fd.mime_type.clone(),
                            display_name: fd.display_name.clone(),
                            video_metadata: fd.video_metadata.clone(),
                        }));
                    }
                }
            }
            out.push(match message {
                Message::User(_) => PromptMessage::user(parts),
                Message::Assistant(_) => PromptMessage::assistant(parts),
            });
        }

        let resolve_names = join_all(headers.keys().map(|&user_id| async move {
            (user_id, names.display_name(user_id).await)
        }));
        let (resolved_names, resolved_urls) =
            tokio::join!(resolve_names, self.resolve_urls(pending.keys().copied()));
        let urls = resolved_urls?;

        for (user_id, name) in resolved_names {
            for &(idx, ts) in &headers[user_id] {
                out[idx].parts[0] = PromptPart::text(self.header(&name, ts));
            }
        }
        for (key, url) in urls {
            for &(idx, part) in &pending[key] {
                if let PromptPart::File(file) = &mut out[idx].parts[part] {
                    file.uri = Some(url.clone());
                }
            }
        }

        Ok(out)
    }

    /// One signed-URL lookup per distinct key, all in flight at once.
    async fn resolve_urls<'k>(
        &self,
        keys: impl Iterator<Item = &'k str>,
    ) -> Result<Vec<(&'k str, String)>> {
        let started = Instant::now();
        let results = join_all(keys.map(|key| async move {
            (key, self.media.signed_url(key, self.url_ttl).await)
        }))
        .await;
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let mut urls = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for (key, res) in results {
            match res {
                Ok(url) => urls.push((key, url)),
                Err(e) => {
                    tracing::warn!(storage_key = key, error = %e, "signed url lookup failed");
                    errors.push(e);
                }
            }
        }

        TraceEvent::MediaResolved {
            keys: urls.len() + errors.len(),
            failed: errors.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        if errors.is_empty() {
            Ok(urls)
        } else {
            Err(Error::Aggregate(errors))
        }
    }

    fn header(&self, name: &str, ts: DateTime<Utc>) -> String {
        format!(
            "{name} ({}):",
            ts.with_timezone(&self.timezone).format("%Y-%m-%d %H:%M")
        )
    }
}
