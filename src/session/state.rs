//! Continuous-listening state machine
//!
//! Defines the session states and the single transition function that maps
//! `(state, input)` to a new state plus a list of side effects for the
//! manager to execute. The machine owns the transcript buffer and the busy
//! backoff counter; it performs no I/O itself, which keeps every policy
//! decision unit-testable without an engine or a runtime.

use super::classifier::{classify, BackoffCounter, ErrorCategory};
use super::SessionError;
use crate::config::RestartConfig;
use crate::engine::{EngineErrorCode, EngineEvent};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session lifecycle state
///
/// Exactly one value is held at any instant; transitions inside
/// [`SessionMachine::process`] are the only legal mutation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No engine constructed yet
    #[default]
    Uninitialized,
    /// Engine constructed, not listening
    Ready,
    /// An activation is in flight (or a restart into one is pending)
    Listening,
    /// Cancel requested, awaiting its completion
    Stopping,
    /// Terminal; no further restarts
    FatalError,
    /// Terminal; engine released
    Destroyed,
}

impl SessionState {
    /// Returns a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "Not set up",
            SessionState::Ready => "Ready to listen",
            SessionState::Listening => "Listening for speech",
            SessionState::Stopping => "Stopping",
            SessionState::FatalError => "Failed permanently",
            SessionState::Destroyed => "Destroyed",
        }
    }

    /// Returns whether this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::FatalError | SessionState::Destroyed)
    }
}

/// How a fired restart re-enters listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartKind {
    /// Re-issue `start` on the existing engine instance
    Resume,
    /// Rebuild the engine from scratch, then start (busy recovery)
    Rebuild,
}

/// Inputs consumed by the transition function.
///
/// Owner commands, engine events, and timer fires all arrive through the
/// same mailbox and are processed in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Owner requested `setup()`
    SetupRequested,
    /// The factory produced a fresh engine adapter
    EngineBuilt,
    /// The platform reports no recognition capability
    EngineMissing,
    /// Owner requested `start_listening()`; authorization already checked
    StartRequested { authorized: bool },
    /// The engine rejected the `start` call
    StartFailed,
    /// Owner requested `stop_listening()`
    StopRequested,
    /// The requested engine cancel has been issued
    CancelFinished,
    /// Owner requested `destroy()`
    DestroyRequested,
    /// A live restart ticket fired
    RestartFired { kind: RestartKind, authorized: bool },
    /// An event reported by the engine adapter
    Engine(EngineEvent),
}

/// Side effects for the manager to execute, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Construct a fresh engine adapter via the factory
    BuildEngine,
    /// Issue `cancel` then `start` on the engine
    StartEngine,
    /// Issue `cancel` on the engine, then feed back [`Input::CancelFinished`]
    CancelEngine,
    /// Issue `cancel` + `destroy` and drop the adapter
    TeardownEngine,
    /// Arm the single restart slot, replacing any pending ticket
    ArmRestart { delay: Duration, kind: RestartKind },
    /// Cancel any pending restart ticket
    CancelRestart,
    /// Commit a final result to the owner and the command router
    EmitResult(String),
    /// Forward an in-progress hypothesis to the owner
    EmitPartial(String),
    /// Surface an error message to the owner
    EmitError(String),
}

/// The session transition core.
///
/// Owned exclusively by the session manager task; never shared.
pub struct SessionMachine {
    state: SessionState,
    restart: RestartConfig,
    backoff: BackoffCounter,
    /// Partial fragments accumulated since the last committed final
    transcript: Vec<String>,
    /// Whether an engine adapter currently exists
    engine_alive: bool,
    /// Set while a busy-recovery rebuild should start listening once built
    start_after_build: bool,
    /// Most recent committed result, kept for status queries
    last_result: Option<String>,
}

impl SessionMachine {
    /// Creates a new machine in the `Uninitialized` state.
    pub fn new(restart: RestartConfig) -> Self {
        let backoff = BackoffCounter::new(
            restart.busy_reset_delay_ms,
            restart.busy_backoff_ceiling_ms,
            restart.busy_backoff_growth,
        );
        Self {
            state: SessionState::Uninitialized,
            restart,
            backoff,
            transcript: Vec::new(),
            engine_alive: false,
            start_after_build: false,
            last_result: None,
        }
    }

    /// Returns the current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Partial fragments accumulated since the last committed final
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Consecutive busy faults since the last successful outcome
    pub fn backoff_count(&self) -> u32 {
        self.backoff.count()
    }

    /// The most recent committed result, if any
    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    /// Process one input and return the side effects to execute.
    pub fn process(&mut self, input: Input) -> Vec<Action> {
        // A destroyed session only comes back through setup().
        if self.state == SessionState::Destroyed && input != Input::SetupRequested {
            tracing::debug!("Session destroyed, dropping {:?}", input);
            return Vec::new();
        }

        match input {
            Input::SetupRequested => self.on_setup_requested(),
            Input::EngineBuilt => self.on_engine_built(),
            Input::EngineMissing => {
                self.set_state(SessionState::FatalError);
                vec![Action::EmitError(SessionError::EngineUnavailable.to_string())]
            }
            Input::StartRequested { authorized } => self.on_start_requested(authorized),
            Input::StartFailed => {
                if self.state == SessionState::Listening {
                    self.transcript.clear();
                    self.set_state(SessionState::Ready);
                }
                vec![Action::EmitError("Failed to start listening".to_string())]
            }
            Input::StopRequested => self.on_stop_requested(),
            Input::CancelFinished => {
                if self.state == SessionState::Stopping {
                    self.set_state(SessionState::Ready);
                }
                Vec::new()
            }
            Input::DestroyRequested => self.on_destroy_requested(),
            Input::RestartFired { kind, authorized } => self.on_restart_fired(kind, authorized),
            Input::Engine(event) => self.on_engine_event(event),
        }
    }

    fn on_setup_requested(&mut self) -> Vec<Action> {
        match self.state {
            SessionState::Uninitialized | SessionState::FatalError | SessionState::Destroyed => {
                // Always clean before new setup
                let mut actions = Vec::new();
                if self.engine_alive {
                    actions.push(Action::TeardownEngine);
                    self.engine_alive = false;
                }
                self.transcript.clear();
                self.backoff.reset();
                self.start_after_build = false;
                self.set_state(SessionState::Uninitialized);
                actions.push(Action::BuildEngine);
                actions
            }
            current => {
                tracing::warn!("setup() ignored in state {:?}", current);
                Vec::new()
            }
        }
    }

    fn on_engine_built(&mut self) -> Vec<Action> {
        self.engine_alive = true;
        if self.start_after_build {
            // Busy recovery: resume listening on the rebuilt engine
            self.start_after_build = false;
            self.transcript.clear();
            self.set_state(SessionState::Listening);
            vec![Action::StartEngine]
        } else {
            self.set_state(SessionState::Ready);
            Vec::new()
        }
    }

    fn on_start_requested(&mut self, authorized: bool) -> Vec<Action> {
        match self.state {
            // Already listening: idempotent no-op
            SessionState::Listening => Vec::new(),
            SessionState::Ready => {
                if !authorized {
                    return vec![Action::EmitError(
                        SessionError::PermissionDenied.to_string(),
                    )];
                }
                self.transcript.clear();
                self.set_state(SessionState::Listening);
                vec![Action::StartEngine]
            }
            current => {
                tracing::warn!("start_listening() ignored in state {:?}", current);
                Vec::new()
            }
        }
    }

    fn on_stop_requested(&mut self) -> Vec<Action> {
        // The pending ticket dies with the stop even when we are not
        // listening (e.g. during a busy-recovery wait).
        let mut actions = vec![Action::CancelRestart];
        if self.state == SessionState::Listening {
            self.transcript.clear();
            self.set_state(SessionState::Stopping);
            actions.push(Action::CancelEngine);
        }
        actions
    }

    fn on_destroy_requested(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::CancelRestart];
        if self.engine_alive {
            actions.push(Action::TeardownEngine);
            self.engine_alive = false;
        }
        self.transcript.clear();
        self.start_after_build = false;
        self.set_state(SessionState::Destroyed);
        actions
    }

    fn on_restart_fired(&mut self, kind: RestartKind, authorized: bool) -> Vec<Action> {
        match (self.state, kind) {
            (SessionState::Listening, RestartKind::Resume) => {
                if !authorized {
                    self.transcript.clear();
                    self.set_state(SessionState::Ready);
                    return vec![Action::EmitError(
                        SessionError::PermissionDenied.to_string(),
                    )];
                }
                // A fired restart begins a new activation
                self.transcript.clear();
                vec![Action::StartEngine]
            }
            (SessionState::Ready, RestartKind::Rebuild) => {
                if !authorized {
                    return vec![Action::EmitError(
                        SessionError::PermissionDenied.to_string(),
                    )];
                }
                self.start_after_build = true;
                vec![Action::BuildEngine]
            }
            (current, kind) => {
                tracing::debug!("Stale restart ({:?}) dropped in state {:?}", kind, current);
                Vec::new()
            }
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) -> Vec<Action> {
        // Events from a cancelled or torn-down activation are stale.
        if self.state != SessionState::Listening {
            tracing::debug!("Stale engine event {:?} in state {:?}", event, self.state);
            return Vec::new();
        }

        match event {
            EngineEvent::Final { text } => {
                self.transcript.clear();
                self.backoff.reset();
                self.last_result = Some(text.clone());
                vec![
                    Action::EmitResult(text),
                    Action::ArmRestart {
                        delay: self.restart.base_delay(),
                        kind: RestartKind::Resume,
                    },
                ]
            }
            EngineEvent::EndOfSpeech => {
                // Silence can arrive before (or instead of) a final result;
                // re-arm either way. A following final replaces this ticket.
                vec![Action::ArmRestart {
                    delay: self.restart.base_delay(),
                    kind: RestartKind::Resume,
                }]
            }
            EngineEvent::Partial { text } => {
                self.transcript.push(text.clone());
                vec![Action::EmitPartial(text)]
            }
            EngineEvent::Error { code } => self.on_engine_error(code),
            // Presentation-only events carry no state
            EngineEvent::Ready | EngineEvent::SpeechBegan | EngineEvent::RmsChanged { .. } => {
                Vec::new()
            }
        }
    }

    fn on_engine_error(&mut self, code: EngineErrorCode) -> Vec<Action> {
        let message = code.message();
        tracing::warn!("Engine error: {}", message);

        match classify(code) {
            ErrorCategory::Fatal => {
                self.transcript.clear();
                self.set_state(SessionState::FatalError);
                vec![Action::CancelRestart, Action::EmitError(message)]
            }
            ErrorCategory::PermissionDenied => {
                self.transcript.clear();
                self.set_state(SessionState::Ready);
                vec![Action::CancelRestart, Action::EmitError(message)]
            }
            ErrorCategory::Busy => {
                // The recogniser is wedged; rebuild from scratch after an
                // escalating wait.
                self.transcript.clear();
                self.engine_alive = false;
                self.set_state(SessionState::Ready);
                let delay = self.backoff.next_delay();
                vec![
                    Action::EmitError(message),
                    Action::TeardownEngine,
                    Action::ArmRestart {
                        delay,
                        kind: RestartKind::Rebuild,
                    },
                ]
            }
            ErrorCategory::Recoverable => {
                self.backoff.reset();
                vec![
                    Action::EmitError(message),
                    Action::ArmRestart {
                        delay: self.restart.base_delay(),
                        kind: RestartKind::Resume,
                    },
                ]
            }
        }
    }

    fn set_state(&mut self, new_state: SessionState) {
        if self.state != new_state {
            tracing::info!("Session state transition: {:?} -> {:?}", self.state, new_state);
            self.state = new_state;
        }
    }
}
