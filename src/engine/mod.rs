//! Recognition engine boundary
//!
//! The engine is consumed, not implemented: an opaque single-shot
//! speech-to-text capability with `start`/`cancel`/`stop`/`destroy`
//! operations and an asynchronous event callback. This module defines the
//! trait seams an adapter implements and the event vocabulary it speaks.

pub mod adapter;
pub mod event;

pub use adapter::{
    AlwaysAuthorized, CaptureAuthorization, EngineEventSender, EngineFactory, SpeechEngine,
};
pub use event::{EngineErrorCode, EngineEvent};
