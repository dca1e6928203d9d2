//! Engine adapter and authorization seams
//!
//! The recognition engine is an external capability: this crate drives it
//! through the [`SpeechEngine`] trait and receives its events through a
//! channel. Adapters push [`EngineEvent`]s from whatever thread or callback
//! context the platform uses; the session serialises them before acting.

use super::event::EngineEvent;
use crate::config::EngineConfig;
use anyhow::Result;
use tokio::sync::mpsc;

/// Channel on which an engine adapter reports its events.
///
/// Cloneable; adapters keep one and push from their callback context.
pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;

/// A single-shot recognition engine.
///
/// One `start` begins one activation; the activation ends with a terminal
/// event (`Final`, `EndOfSpeech` without a result, or `Error`). `cancel`,
/// `stop` and `destroy` are best-effort: the session logs their failures
/// and never propagates them.
pub trait SpeechEngine: Send {
    /// Begin one activation. The config carries language/model hints and
    /// silence thresholds; none of it affects session control logic.
    fn start(&mut self, config: &EngineConfig) -> Result<()>;

    /// Abort the in-flight activation, discarding any pending result.
    fn cancel(&mut self) -> Result<()>;

    /// End the in-flight activation, letting a pending result be delivered.
    fn stop(&mut self) -> Result<()>;

    /// Release engine resources. The adapter must not emit events afterwards.
    fn destroy(&mut self) -> Result<()>;
}

/// Constructs engine adapters.
///
/// The session rebuilds its adapter from scratch after a busy-class
/// failure, so construction is a first-class seam rather than a one-time
/// argument.
pub trait EngineFactory: Send {
    /// Whether the platform offers a recognition capability at all.
    fn is_available(&self) -> bool;

    /// Build a fresh adapter that reports events on `events`.
    fn build(&mut self, events: EngineEventSender) -> Result<Box<dyn SpeechEngine>>;
}

/// Reports whether audio-capture authorization is currently held.
///
/// Obtaining the authorization is the owner's responsibility; the session
/// only checks it before issuing `start`, including on automatic restarts.
pub trait CaptureAuthorization: Send {
    fn is_authorized(&self) -> bool;
}

/// Blanket authorization for hosts where capture is always permitted.
pub struct AlwaysAuthorized;

impl CaptureAuthorization for AlwaysAuthorized {
    fn is_authorized(&self) -> bool {
        true
    }
}
