//! Continuous recognition session
//!
//! Wraps a single-shot recognition engine in a session that keeps
//! listening: every terminal engine outcome (result, silence, error) is
//! classified and answered with a scheduled re-activation, a full engine
//! rebuild, or a terminal stop.
//!
//! ## States
//!
//! ```text
//! Uninitialized --setup()--> Ready --start_listening()--> Listening
//! Ready --setup() failure--> FatalError
//! Listening --final/end of speech--> Listening   (via scheduled restart)
//! Listening --error: recoverable--> Listening    (via scheduled restart)
//! Listening --error: busy--> Ready --timer--> Listening  (engine rebuilt)
//! Listening --error: permission--> Ready         (no restart)
//! Listening --error: fatal--> FatalError
//! Listening --stop_listening()--> Ready          (via transient Stopping)
//! (any) --destroy()--> Destroyed
//! ```
//!
//! ## Restart discipline
//!
//! At most one restart is ever pending; arming a new ticket replaces the
//! previous one, and stop/destroy cancel it synchronously with the state
//! transition. A ticket firing after the session entered a terminal state
//! is a silent no-op. This single-slot rule is what prevents two timers
//! from racing `start` calls into a busy engine.

pub mod classifier;
pub mod manager;
pub mod scheduler;
pub mod state;

pub use classifier::{classify, BackoffCounter, ErrorCategory};
pub use manager::{SessionHandle, SessionManager, SessionNotice, SessionStatus};
pub use state::{SessionMachine, SessionState};

/// Session-level failures surfaced to the owner.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The platform offers no recognition capability
    #[error("Speech recognition not available on this device")]
    EngineUnavailable,

    /// Audio-capture authorization is missing; the caller may retry
    /// `start_listening()` once it is granted
    #[error("Microphone permission not granted")]
    PermissionDenied,

    /// The session was destroyed and its mailbox is closed
    #[error("Session has been destroyed")]
    Terminated,
}
