//! Messaging-platform integration for murmur.
//!
//! - [`events`]: webhook payload types as delivered by the platform.
//! - [`PlatformClient`]: the outbound calls the pipeline makes (media
//!   download, loading indicator, replies, group and user metadata).
//! - [`HttpPlatformClient`]: a LINE-style Messaging API implementation.
//! - [`verify_signature`]: webhook body authentication.

pub mod client;
pub mod events;
pub mod http;
pub mod signature;

pub use client::{GroupSummary, MediaContent, PlatformClient};
pub use http::HttpPlatformClient;
pub use signature::verify_signature;
