//! Session manager
//!
//! The single authoritative owner of the engine lifecycle. A spawned actor
//! task consumes one mailbox merging owner commands, engine events, and
//! restart-timer fires, feeds each into the transition core, and executes
//! the resulting side effects. All session state is private to the task;
//! the owner talks to it through a cloneable [`SessionHandle`] and listens
//! on a notice channel.

use super::scheduler::RestartScheduler;
use super::state::{Action, Input, RestartKind, SessionMachine, SessionState};
use super::SessionError;
use crate::config::SessionConfig;
use crate::engine::{CaptureAuthorization, EngineEvent, EngineEventSender, EngineFactory, SpeechEngine};
use crate::router::{CommandReceiver, ResultRouter};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Owner lifecycle commands, enqueued onto the session mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Setup,
    StartListening,
    StopListening,
    Destroy,
}

/// Everything the session actor can receive.
#[derive(Debug, PartialEq)]
pub(crate) enum Mail {
    Command(SessionCommand),
    Engine(EngineEvent),
    RestartElapsed { generation: u64, kind: RestartKind },
}

/// Event emitted to the owning application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotice {
    /// A committed recognition result
    Result { text: String },
    /// An in-progress hypothesis
    Partial { text: String },
    /// An error message; terminal only when paired with `FatalError`
    Error { message: String },
    /// Input sound level changed (RMS dB), for level meters
    RmsLevel { level: f32 },
    /// The engine is ready for speech
    EngineReady,
    /// The user started speaking
    SpeechBegan,
    /// The session moved to a new state
    StateChanged {
        previous: SessionState,
        current: SessionState,
    },
}

/// Snapshot of the session for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Current state
    pub state: SessionState,
    /// State description for display
    pub description: String,
    /// Consecutive busy faults since the last successful outcome
    pub busy_failures: u32,
    /// Whether a restart is currently armed
    pub restart_pending: bool,
    /// Most recent committed result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<String>,
}

impl SessionStatus {
    fn initial() -> Self {
        Self {
            state: SessionState::Uninitialized,
            description: SessionState::Uninitialized.description().to_string(),
            busy_failures: 0,
            restart_pending: false,
            last_result: None,
        }
    }
}

/// Cloneable handle to a running session.
///
/// All lifecycle calls are non-blocking: they enqueue onto the session
/// mailbox and return immediately; completion is observed via notices.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Mail>,
    status: Arc<RwLock<SessionStatus>>,
}

impl SessionHandle {
    /// Construct the engine adapter. Valid from `Uninitialized` or a
    /// terminal state; emits an error notice and enters `FatalError` when
    /// the platform has no recognition capability.
    pub fn setup(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Setup)
    }

    /// Begin continuous listening. No-op when already listening; emits a
    /// permission error and stays `Ready` when capture authorization is
    /// absent.
    pub fn start_listening(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::StartListening)
    }

    /// Stop listening and cancel any pending restart. No-op when not
    /// listening (but a pending restart is still cancelled).
    pub fn stop_listening(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::StopListening)
    }

    /// Tear down the session. Idempotent; safe from any state.
    pub fn destroy(&self) -> Result<(), SessionError> {
        // A second destroy after the actor exited is still a success.
        let _ = self.tx.send(Mail::Command(SessionCommand::Destroy));
        Ok(())
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        self.status.read().state
    }

    /// A full status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.tx
            .send(Mail::Command(command))
            .map_err(|_| SessionError::Terminated)
    }
}

/// Spawns session actors.
pub struct SessionManager;

impl SessionManager {
    /// Spawn a session onto the current tokio runtime.
    ///
    /// Returns the owner handle, the notice stream, and the downstream
    /// debounced command stream. The session runs until `destroy()`.
    pub fn spawn(
        factory: Box<dyn EngineFactory>,
        authorization: Box<dyn CaptureAuthorization>,
        config: SessionConfig,
    ) -> (
        SessionHandle,
        mpsc::UnboundedReceiver<SessionNotice>,
        CommandReceiver,
    ) {
        let (mail_tx, mail_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let (router, commands) = ResultRouter::new(config.debounce.window(), notice_tx.clone());
        let status = Arc::new(RwLock::new(SessionStatus::initial()));

        let actor = SessionActor {
            id: Uuid::new_v4(),
            machine: SessionMachine::new(config.restart.clone()),
            config,
            factory,
            authorization,
            engine: None,
            engine_tx,
            scheduler: RestartScheduler::new(mail_tx.clone()),
            router,
            notices: notice_tx,
            status: status.clone(),
        };
        tokio::spawn(actor.run(mail_rx, engine_rx));

        (
            SessionHandle {
                tx: mail_tx,
                status,
            },
            notice_rx,
            commands,
        )
    }
}

/// The actor owning all mutable session state.
struct SessionActor {
    id: Uuid,
    machine: SessionMachine,
    config: SessionConfig,
    factory: Box<dyn EngineFactory>,
    authorization: Box<dyn CaptureAuthorization>,
    engine: Option<Box<dyn SpeechEngine>>,
    /// Handed to every engine the factory builds; kept so rebuilds reuse
    /// the same event channel
    engine_tx: EngineEventSender,
    scheduler: RestartScheduler,
    router: ResultRouter,
    notices: mpsc::UnboundedSender<SessionNotice>,
    status: Arc<RwLock<SessionStatus>>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut mail_rx: mpsc::UnboundedReceiver<Mail>,
        mut engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        tracing::info!("Session {} started", self.id);

        loop {
            let mail = tokio::select! {
                Some(mail) = mail_rx.recv() => mail,
                Some(event) = engine_rx.recv() => Mail::Engine(event),
                else => break,
            };

            self.handle_mail(mail);

            if self.machine.state() == SessionState::Destroyed {
                break;
            }
        }

        // Hygiene on exit: no ticket may outlive the session, and the
        // adapter is released even when the mailbox closed without destroy.
        self.scheduler.cancel_pending();
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.cancel() {
                tracing::debug!("Session {}: cancel on shutdown failed: {}", self.id, e);
            }
            if let Err(e) = engine.destroy() {
                tracing::warn!("Session {}: destroy on shutdown failed: {}", self.id, e);
            }
        }
        tracing::info!("Session {} terminated", self.id);
    }

    fn handle_mail(&mut self, mail: Mail) {
        match mail {
            Mail::Command(command) => {
                tracing::debug!("Session {}: command {:?}", self.id, command);
                let input = match command {
                    SessionCommand::Setup => Input::SetupRequested,
                    SessionCommand::StartListening => Input::StartRequested {
                        authorized: self.authorization.is_authorized(),
                    },
                    SessionCommand::StopListening => Input::StopRequested,
                    SessionCommand::Destroy => Input::DestroyRequested,
                };
                self.dispatch(input);
            }
            Mail::Engine(event) => self.handle_engine_event(event),
            Mail::RestartElapsed { generation, kind } => {
                // A ticket superseded or cancelled after firing is stale.
                if !self.scheduler.acknowledge(generation) {
                    return;
                }
                self.dispatch(Input::RestartFired {
                    kind,
                    authorized: self.authorization.is_authorized(),
                });
            }
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            // Presentation-only events are forwarded while listening and
            // carry no state transition.
            EngineEvent::Ready => {
                tracing::debug!("Session {}: ready for speech", self.id);
                if self.machine.state() == SessionState::Listening {
                    let _ = self.notices.send(SessionNotice::EngineReady);
                }
            }
            EngineEvent::SpeechBegan => {
                tracing::debug!("Session {}: user started speaking", self.id);
                if self.machine.state() == SessionState::Listening {
                    let _ = self.notices.send(SessionNotice::SpeechBegan);
                }
            }
            EngineEvent::RmsChanged { level } => {
                if self.machine.state() == SessionState::Listening {
                    let _ = self.notices.send(SessionNotice::RmsLevel { level });
                }
            }
            other => self.dispatch(Input::Engine(other)),
        }
    }

    /// Run one input through the transition core, executing actions in
    /// order. Actions can produce follow-up inputs (engine built, cancel
    /// finished), which are processed before returning so the mailbox only
    /// ever sees settled states.
    fn dispatch(&mut self, input: Input) {
        let mut queue = VecDeque::new();
        queue.push_back(input);

        while let Some(input) = queue.pop_front() {
            let previous = self.machine.state();
            let actions = self.machine.process(input);

            for action in actions {
                if let Some(followup) = self.execute(action) {
                    queue.push_back(followup);
                }
            }

            let current = self.machine.state();
            if previous != current {
                let _ = self
                    .notices
                    .send(SessionNotice::StateChanged { previous, current });
            }
        }

        self.refresh_status();
    }

    fn execute(&mut self, action: Action) -> Option<Input> {
        match action {
            Action::BuildEngine => {
                if !self.factory.is_available() {
                    tracing::error!(
                        "Session {}: no recognition capability on this platform",
                        self.id
                    );
                    return Some(Input::EngineMissing);
                }
                match self.factory.build(self.engine_tx.clone()) {
                    Ok(engine) => {
                        self.engine = Some(engine);
                        tracing::debug!("Session {}: engine adapter built", self.id);
                        Some(Input::EngineBuilt)
                    }
                    Err(e) => {
                        tracing::error!("Session {}: engine construction failed: {}", self.id, e);
                        Some(Input::EngineMissing)
                    }
                }
            }
            Action::StartEngine => {
                let Some(engine) = self.engine.as_mut() else {
                    tracing::warn!("Session {}: start requested without an engine", self.id);
                    return Some(Input::StartFailed);
                };
                // Flush a half-open activation before starting the next one
                if let Err(e) = engine.cancel() {
                    tracing::debug!("Session {}: pre-start cancel failed: {}", self.id, e);
                }
                match engine.start(&self.config.engine) {
                    Ok(()) => {
                        tracing::debug!("Session {}: listening started", self.id);
                        None
                    }
                    Err(e) => {
                        tracing::warn!("Session {}: start failed: {}", self.id, e);
                        Some(Input::StartFailed)
                    }
                }
            }
            Action::CancelEngine => {
                if let Some(engine) = self.engine.as_mut() {
                    if let Err(e) = engine.cancel() {
                        tracing::warn!("Session {}: cancel failed: {}", self.id, e);
                    }
                }
                Some(Input::CancelFinished)
            }
            Action::TeardownEngine => {
                if let Some(mut engine) = self.engine.take() {
                    if let Err(e) = engine.cancel() {
                        tracing::debug!("Session {}: cancel during teardown failed: {}", self.id, e);
                    }
                    if let Err(e) = engine.destroy() {
                        tracing::warn!("Session {}: destroy failed: {}", self.id, e);
                    }
                }
                None
            }
            Action::ArmRestart { delay, kind } => {
                self.scheduler.arm(delay, kind);
                None
            }
            Action::CancelRestart => {
                self.scheduler.cancel_pending();
                None
            }
            Action::EmitResult(text) => {
                tracing::info!("Session {}: result: {}", self.id, text);
                let now = tokio::time::Instant::now().into_std();
                self.router.route_final(text, now);
                None
            }
            Action::EmitPartial(text) => {
                self.router.route_partial(text);
                None
            }
            Action::EmitError(message) => {
                tracing::warn!("Session {}: {}", self.id, message);
                let _ = self.notices.send(SessionNotice::Error { message });
                None
            }
        }
    }

    fn refresh_status(&self) {
        let mut status = self.status.write();
        status.state = self.machine.state();
        status.description = self.machine.state().description().to_string();
        status.busy_failures = self.machine.backoff_count();
        status.restart_pending = self.scheduler.is_pending();
        status.last_result = self.machine.last_result().map(|s| s.to_string());
    }
}
