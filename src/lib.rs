//! wallwarden — group wall moderation engine.
//!
//! Polls group walls for new posts, classifies them against a per-group
//! moderation policy with an LLM, and dispatches the resulting actions
//! (deletion, exile, demotion, rank change) with an append-only audit log.
//!
//! Architecture:
//! - `monitor`: per-group polling tasks and the registry that owns them
//! - `fetcher`: cursor-based new-post extraction from the wall feed
//! - `classifier`: rate-budgeted LLM verdicts with a lenient parse ladder
//! - `dispatch`: action execution state machine and audit logging
//! - `feed`: group API trait and its HTTP implementation
//! - `store`: subscription policies and the moderation log (libSQL)
//! - `notify`: best-effort webhook notifications for executed actions

pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod monitor;
pub mod notify;
pub mod store;

pub use config::EngineConfig;
pub use error::{Error, Result};
