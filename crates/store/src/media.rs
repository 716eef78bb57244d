//! Chat media persistence and signed read URLs.
//!
//! Media is written once under a storage key scoped to the conversation
//! and the originating message:
//!
//! ```text
//! {conversation_id}/{message_id}-{sha256 prefix}
//! ```
//!
//! The key is stable and derived from content, so it is safe to keep in
//! the Message Log.  Access URLs are not: they carry an expiry and an
//! HMAC-SHA256 signature and are minted per request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use mm_domain::error::{Error, Result};

use crate::fsutil::{blocking, validate_segment, write_atomic};

type HmacSha256 = Hmac<Sha256>;

/// Durable media storage addressed by storage key.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist `bytes` for one message and return its storage key.
    async fn store(
        &self,
        conversation_id: &str,
        message_id: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<String>;

    /// Mint a temporary URL for a previously stored key.
    async fn signed_url(&self, storage_key: &str, ttl: Duration) -> Result<String>;
}

/// Bytes + MIME type read back from the store.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Filesystem media store under `state_path/media/`.  Signed URLs point
/// at this server's `GET /media/*key` route.
pub struct FsMediaStore {
    dir: PathBuf,
    public_base_url: String,
    signing_key: Vec<u8>,
}

impl FsMediaStore {
    pub fn new(state_path: &Path, public_base_url: &str, signing_key: Vec<u8>) -> Result<Self> {
        let dir = state_path.join("media");
        std::fs::create_dir_all(&dir)?;
        tracing::info!(path = %dir.display(), "media store ready");
        Ok(Self {
            dir,
            public_base_url: public_base_url.trim_end_matches('/').to_owned(),
            signing_key,
        })
    }

    fn path_for(&self, storage_key: &str) -> Result<PathBuf> {
        let mut segments = storage_key.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(conversation), Some(object), None) => {
                validate_segment("conversation id", conversation)?;
                validate_segment("object name", object)?;
                Ok(self.dir.join(conversation).join(object))
            }
            _ => Err(Error::Other(format!("invalid storage key: {storage_key:?}"))),
        }
    }

    fn sign(&self, storage_key: &str, expires: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .expect("HMAC accepts any key length");
        mac.update(storage_key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check a presented signature for `storage_key`.  Expired links are
    /// rejected even when the signature matches.
    pub fn verify(&self, storage_key: &str, expires: i64, sig: &str, now: DateTime<Utc>) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        let expected = self.sign(storage_key, expires);
        expected.as_bytes().ct_eq(sig.as_bytes()).unwrap_u8() == 1
    }

    /// Read a stored object back.
    pub async fn open(&self, storage_key: &str) -> Result<StoredMedia> {
        let path = self.path_for(storage_key)?;
        let key = storage_key.to_owned();
        blocking(move || {
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(Error::NotFound(format!("media {key}")));
                }
                Err(e) => return Err(Error::Io(e)),
            };
            let mime_type = std::fs::read_to_string(mime_path(&path))
                .map(|m| m.trim().to_owned())
                .unwrap_or_else(|_| "application/octet-stream".into());
            Ok(StoredMedia { bytes, mime_type })
        })
        .await
    }
}

fn mime_path(object: &Path) -> PathBuf {
    object.with_extension("mime")
}

fn content_prefix(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn store(
        &self,
        conversation_id: &str,
        message_id: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<String> {
        validate_segment("conversation id", conversation_id)?;
        validate_segment("message id", message_id)?;

        let key = format!("{conversation_id}/{message_id}-{}", content_prefix(&bytes));
        let path = self.path_for(&key)?;
        let mime = mime_type.to_owned();
        let size = bytes.len();

        blocking(move || {
            write_atomic(&path, &bytes)?;
            write_atomic(&mime_path(&path), mime.as_bytes())
        })
        .await?;

        tracing::debug!(storage_key = %key, bytes = size, "media stored");
        Ok(key)
    }

    async fn signed_url(&self, storage_key: &str, ttl: Duration) -> Result<String> {
        let path = self.path_for(storage_key)?;
        let exists = blocking(move || Ok(path.exists())).await?;
        if !exists {
            return Err(Error::NotFound(format!("media {storage_key}")));
        }

        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let sig = self.sign(storage_key, expires);
        Ok(format!(
            "{}/media/{storage_key}?expires={expires}&sig={sig}",
            self.public_base_url
        ))
    }
}
