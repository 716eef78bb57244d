//! Cached user and group profiles.
//!
//! Profiles are written by the follow / join / member-change handlers and
//! read by the context enricher and the display-name resolver.  Reads are
//! served from memory; writes go through to `profiles.json` when the store
//! is file-backed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use mm_domain::chat::{GroupProfile, UserProfile};
use mm_domain::error::{Error, Result};

use crate::fsutil::{blocking, write_atomic};

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn user_profile(&self, user_id: &str) -> Result<UserProfile>;
    async fn group_profile(&self, group_id: &str) -> Result<GroupProfile>;
    async fn put_user_profile(&self, profile: UserProfile) -> Result<()>;
    async fn put_group_profile(&self, profile: GroupProfile) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Profiles {
    #[serde(default)]
    users: HashMap<String, UserProfile>,
    #[serde(default)]
    groups: HashMap<String, GroupProfile>,
}

/// Profile store kept in memory, optionally persisted as one JSON file.
pub struct JsonProfileStore {
    path: Option<PathBuf>,
    profiles: RwLock<Profiles>,
    /// Orders flushes; owned by the blocking write until it lands.
    flush_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonProfileStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            profiles: RwLock::new(Profiles::default()),
            flush_lock: Arc::default(),
        }
    }

    /// Load or create the store at `state_path/profiles.json`.
    pub fn open(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path)?;
        let path = state_path.join("profiles.json");
        let profiles = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&raw) {
                Ok(profiles) => profiles,
                Err(e) => {
                    let aside = path.with_extension(format!(
                        "json.corrupt-{}",
                        chrono::Utc::now().format("%Y%m%dT%H%M%S")
                    ));
                    std::fs::rename(&path, &aside)?;
                    tracing::warn!(
                        error = %e,
                        moved_to = %aside.display(),
                        "unreadable profiles file moved aside, starting empty"
                    );
                    Profiles::default()
                }
            }
        } else {
            Profiles::default()
        };

        tracing::info!(
            users = profiles.users.len(),
            groups = profiles.groups.len(),
            path = %path.display(),
            "profile store loaded"
        );

        Ok(Self {
            path: Some(path),
            profiles: RwLock::new(profiles),
            flush_lock: Arc::default(),
        })
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        // Snapshot under the flush lock so a later snapshot never lands
        // before an earlier one.
        let guard = self.flush_lock.clone().lock_owned().await;
        let buf = {
            let profiles = self.profiles.read();
            serde_json::to_vec_pretty(&*profiles)?
        };
        blocking(move || {
            let _guard = guard;
            write_atomic(&path, &buf)
        })
        .await
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    async fn user_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.profiles
            .read()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user profile {user_id}")))
    }

    async fn group_profile(&self, group_id: &str) -> Result<GroupProfile> {
        self.profiles
            .read()
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("group profile {group_id}")))
    }

    async fn put_user_profile(&self, profile: UserProfile) -> Result<()> {
        self.profiles
            .write()
            .users
            .insert(profile.user_id.clone(), profile);
        self.flush().await
    }

    async fn put_group_profile(&self, profile: GroupProfile) -> Result<()> {
        self.profiles
            .write()
            .groups
            .insert(profile.group_id.clone(), profile);
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn alice() -> UserProfile {
        UserProfile {
            user_id: "U1".into(),
            display_name: "Alice".into(),
            picture_url: Some("https://cdn.example.com/alice.jpg".into()),
            status_message: None,
            language: Some("en".into()),
        }
    }

    #[tokio::test]
    async fn missing_profiles_are_not_found() {
        let store = JsonProfileStore::in_memory();
        assert!(store.user_profile("U1").await.unwrap_err().is_not_found());
        assert!(store.group_profile("C1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonProfileStore::open(dir.path()).unwrap();
            store.put_user_profile(alice()).await.unwrap();
            store
                .put_group_profile(GroupProfile {
                    group_id: "C1".into(),
                    name: Some("Book club".into()),
                    picture_url: None,
                    member_count: Some(7),
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let store = JsonProfileStore::open(dir.path()).unwrap();
        assert_eq!(store.user_profile("U1").await.unwrap(), alice());
        assert_eq!(store.group_profile("C1").await.unwrap().member_count, Some(7));
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("profiles.json"), b"{ not json").unwrap();

        let store = JsonProfileStore::open(dir.path()).unwrap();
        assert!(store.user_profile("U1").await.unwrap_err().is_not_found());
        store.put_user_profile(alice()).await.unwrap();

        let kept: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("profiles.json.corrupt-"))
            .collect();
        assert_eq!(kept.len(), 1);
        let original = std::fs::read(dir.path().join(&kept[0])).unwrap();
        assert_eq!(original, b"{ not json");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_all_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonProfileStore::open(dir.path()).unwrap());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut profile = alice();
                profile.user_id = format!("U{i}");
                store.put_user_profile(profile).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let reopened = JsonProfileStore::open(dir.path()).unwrap();
        for i in 0..16 {
            assert!(reopened.user_profile(&format!("U{i}")).await.is_ok(), "U{i} lost");
        }
    }
}
