//! Message Log persistence with optimistic concurrency.
//!
//! The accessor never locks across a turn.  Callers load the log and its
//! [`Generation`], append locally, and save with the generation they
//! loaded.  The store compares and swaps atomically: if another writer
//! saved in between, the save fails with `Error::Conflict` and the stored
//! log is left untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use mm_domain::error::{Error, Result};
use mm_domain::history::{Generation, Message};

use crate::fsutil::{blocking, validate_segment, write_atomic};

/// Load / compare-and-swap save of a conversation's Message Log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the log and its current generation.  A conversation that has
    /// never been saved yields an empty log and [`Generation::NONE`].
    async fn load(&self, conversation_id: &str) -> Result<(Vec<Message>, Generation)>;

    /// Replace the log if the stored generation still equals `expected`.
    /// Returns the new generation.
    async fn save(
        &self,
        conversation_id: &str,
        messages: &[Message],
        expected: Generation,
    ) -> Result<Generation>;
}

fn conflict(conversation_id: &str, expected: Generation, actual: Generation) -> Error {
    tracing::warn!(
        conversation_id = conversation_id,
        expected = expected.0,
        actual = actual.0,
        "history save rejected: stale generation"
    );
    Error::Conflict {
        conversation_id: conversation_id.to_owned(),
        expected: expected.0,
        actual: actual.0,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-local store.  Used by tests and by `serve` when no durable
/// state is wanted.
#[derive(Default)]
pub struct MemoryHistoryStore {
    logs: Mutex<HashMap<String, (Generation, Vec<Message>)>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self, conversation_id: &str) -> Result<(Vec<Message>, Generation)> {
        Ok(self
            .logs
            .lock()
            .get(conversation_id)
            .map(|(generation, messages)| (messages.clone(), *generation))
            .unwrap_or((Vec::new(), Generation::NONE)))
    }

    async fn save(
        &self,
        conversation_id: &str,
        messages: &[Message],
        expected: Generation,
    ) -> Result<Generation> {
        let mut logs = self.logs.lock();
        let current = logs
            .get(conversation_id)
            .map(|(g, _)| *g)
            .unwrap_or(Generation::NONE);
        if current != expected {
            return Err(conflict(conversation_id, expected, current));
        }
        let next = expected.next();
        logs.insert(conversation_id.to_owned(), (next, messages.to_vec()));
        Ok(next)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
struct StoredLogRef<'a> {
    generation: Generation,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct StoredLog {
    generation: Generation,
    messages: Vec<Message>,
}

/// One JSON document per conversation under `state_path/history/`.
///
/// Read-compare-write runs as a single blocking task that owns the
/// conversation's lock until the rename has landed, so a caller that drops
/// `save` midway (deadline, shutdown) still cannot be overtaken by the next
/// writer.  Locks are forgotten once nobody holds or waits on them.
pub struct FileHistoryStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileHistoryStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("history");
        std::fs::create_dir_all(&dir)?;
        tracing::info!(path = %dir.display(), "history store ready");
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, conversation_id: &str) -> Result<PathBuf> {
        validate_segment("conversation id", conversation_id)?;
        Ok(self.dir.join(format!("{conversation_id}.json")))
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(conversation_id.to_owned())
            .or_default()
            .clone()
    }

    fn release_lock(&self, conversation_id: &str) {
        let mut locks = self.locks.lock();
        if locks
            .get(conversation_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(conversation_id);
        }
    }
}

fn read_log(path: &Path) -> Result<Option<StoredLog>> {
    match std::fs::read(path) {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn load(&self, conversation_id: &str) -> Result<(Vec<Message>, Generation)> {
        let path = self.path_for(conversation_id)?;
        let stored = blocking(move || read_log(&path)).await?;
        Ok(stored
            .map(|s| (s.messages, s.generation))
            .unwrap_or((Vec::new(), Generation::NONE)))
    }

    async fn save(
        &self,
        conversation_id: &str,
        messages: &[Message],
        expected: Generation,
    ) -> Result<Generation> {
        let path = self.path_for(conversation_id)?;
        let next = expected.next();
        let buf = serde_json::to_vec(&StoredLogRef {
            generation: next,
            messages,
        })?;

        let guard = self.lock_for(conversation_id).lock_owned().await;
        let outcome = blocking(move || {
            let _guard = guard;
            let current = read_log(&path)?
                .map(|s| s.generation)
                .unwrap_or(Generation::NONE);
            if current != expected {
                return Ok(Err(current));
            }
            write_atomic(&path, &buf)?;
            Ok(Ok(()))
        })
        .await;
        self.release_lock(conversation_id);

        match outcome? {
            Ok(()) => Ok(next),
            Err(actual) => Err(conflict(conversation_id, expected, actual)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mm_domain::history::{AssistantMessage, Part, UserMessage};

    fn user(id: &str, text: &str) -> Message {
        Message::User(UserMessage {
            message_id: id.into(),
            user_id: "U1".into(),
            timestamp: Utc::now(),
            parts: vec![Part::text(text)],
        })
    }

    async fn stale_token_is_rejected(store: &dyn HistoryStore) {
        let (log, g0) = store.load("U1").await.unwrap();
        assert!(log.is_empty());
        assert_eq!(g0, Generation::NONE);

        let first = vec![user("m1", "hello")];
        let g1 = store.save("U1", &first, g0).await.unwrap();
        assert_eq!(g1, Generation(1));

        // A second writer that also loaded at g0 loses.
        let racer = vec![user("m2", "me too")];
        let err = store.save("U1", &racer, g0).await.unwrap_err();
        assert!(err.is_conflict(), "got {err}");

        let (log, g) = store.load("U1").await.unwrap();
        assert_eq!(log, first);
        assert_eq!(g, g1);
    }

    #[tokio::test]
    async fn memory_store_rejects_stale_generation() {
        stale_token_is_rejected(&MemoryHistoryStore::new()).await;
    }

    #[tokio::test]
    async fn file_store_rejects_stale_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path()).unwrap();
        stale_token_is_rejected(&store).await;
    }

    #[tokio::test]
    async fn file_store_persists_order_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let log = vec![
            user("m1", "first"),
            Message::Assistant(AssistantMessage {
                parts: vec![Part::text("second")],
            }),
            user("m3", "third"),
        ];
        {
            let store = FileHistoryStore::new(dir.path()).unwrap();
            store.save("C1", &log, Generation::NONE).await.unwrap();
        }
        let store = FileHistoryStore::new(dir.path()).unwrap();
        let (loaded, generation) = store.load("C1").await.unwrap();
        assert_eq!(loaded, log);
        assert_eq!(generation, Generation(1));
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path()).unwrap();
        assert!(store.load("../escape").await.is_err());
    }

    async fn exactly_one_winner(store: Arc<dyn HistoryStore>) {
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let log = vec![user(&format!("m{i}"), "race")];
                store.save("U1", &log, Generation::NONE).await
            }));
        }
        let mut wins = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) => assert!(e.is_conflict(), "got {e}"),
            }
        }
        assert_eq!(wins, 1);
        let (log, generation) = store.load("U1").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(generation, Generation(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn memory_store_concurrent_saves_have_exactly_one_winner() {
        exactly_one_winner(Arc::new(MemoryHistoryStore::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn file_store_concurrent_saves_have_exactly_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        exactly_one_winner(Arc::new(FileHistoryStore::new(dir.path()).unwrap())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn file_store_abandoned_save_is_not_overtaken() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path()).unwrap();
        let padding = "x".repeat(2048);
        let bulky: Vec<Message> = (0..4000)
            .map(|i| user(&format!("a{i}"), &padding))
            .collect();

        for round in 0..4 {
            let id = format!("U{round}");
            // Dropped as soon as the timer fires, usually mid-write.
            let _ = tokio::time::timeout(
                std::time::Duration::from_millis(5),
                store.save(&id, &bulky, Generation::NONE),
            )
            .await;

            let late = vec![user("b1", "after the abandoned save")];
            let result = store.save(&id, &late, Generation::NONE).await;
            let (stored, generation) = store.load(&id).await.unwrap();
            assert_eq!(generation, Generation(1), "round {round}");
            match result {
                Ok(g) => {
                    assert_eq!(g, Generation(1));
                    assert_eq!(stored, late, "round {round}");
                }
                Err(e) => {
                    assert!(e.is_conflict(), "round {round}: {e}");
                    assert_eq!(stored.len(), bulky.len(), "round {round}");
                }
            }
        }

        let stray: Vec<_> = std::fs::read_dir(dir.path().join("history"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| !name.ends_with(".json"))
            .collect();
        assert!(stray.is_empty(), "leftover temp files: {stray:?}");
    }

    #[tokio::test]
    async fn file_store_forgets_idle_locks() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path()).unwrap();
        let g1 = store
            .save("U1", &[user("m1", "hi")], Generation::NONE)
            .await
            .unwrap();
        assert!(store
            .save("U1", &[user("m2", "stale")], Generation::NONE)
            .await
            .unwrap_err()
            .is_conflict());
        store.save("U1", &[user("m3", "ok")], g1).await.unwrap();
        store
            .save("C1", &[user("m4", "group")], Generation::NONE)
            .await
            .unwrap();
        assert!(store.locks.lock().is_empty());
    }
}
