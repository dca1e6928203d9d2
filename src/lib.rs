//! Relisten - continuous listening over single-shot speech engines
//!
//! Speech recognition engines deliver one utterance per activation and then
//! go idle or error out. This crate presents the illusion of uninterrupted
//! listening by orchestrating repeated activations: classifying failures,
//! scheduling restarts with backoff, merging partial and final text, and
//! debouncing commands so a restart race never delivers the same utterance
//! twice.
//!
//! The engine itself is an external capability, consumed through the
//! [`engine::SpeechEngine`] and [`engine::EngineFactory`] traits. Spawn a
//! session with [`session::SessionManager::spawn`], drive it through the
//! returned [`session::SessionHandle`], and consume recognised text from
//! the notice and command channels.

pub mod config;
pub mod engine;
pub mod router;
pub mod session;

pub use config::SessionConfig;
pub use engine::{EngineErrorCode, EngineEvent};
pub use session::{SessionError, SessionHandle, SessionManager, SessionNotice, SessionState};
