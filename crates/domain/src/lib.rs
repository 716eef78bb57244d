//! Shared types for murmur: errors, configuration, the persisted Message
//! Log, backend prompt shapes, and structured trace events.

pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod prompt;
pub mod trace;
