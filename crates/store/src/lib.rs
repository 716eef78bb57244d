//! Durable storage for murmur.
//!
//! Three contracts, each with implementations the gateway can wire in:
//!
//! - [`HistoryStore`]: a conversation's Message Log guarded by a
//!   generation token.  Saves are compare-and-swap; a stale token is a
//!   [`Error::Conflict`](mm_domain::error::Error::Conflict), never a
//!   silent overwrite.
//! - [`MediaStore`]: persisted chat media addressed by storage key, read
//!   back through short-lived signed URLs.
//! - [`ProfileStore`]: cached user and group profiles.

pub mod history;
pub mod media;
pub mod profile;

pub(crate) mod fsutil;

pub use history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
pub use media::{FsMediaStore, MediaStore, StoredMedia};
pub use profile::{JsonProfileStore, ProfileStore};
