//! Session orchestration integration tests.
//!
//! Drives a full session actor against a scripted mock engine under paused
//! tokio time, so restart delays and backoff schedules are verified
//! deterministically without real waiting.

use relisten::config::{RestartConfig, SessionConfig};
use relisten::engine::{
    CaptureAuthorization, EngineErrorCode, EngineEvent, EngineEventSender, EngineFactory,
    SpeechEngine,
};
use relisten::router::CommandReceiver;
use relisten::session::{SessionHandle, SessionManager, SessionNotice, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// =============================================================================
// Mock engine
// =============================================================================

/// Engine-facing calls the session issued, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineCall {
    Build,
    Start,
    Cancel,
    Destroy,
}

#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<EngineCall>>>);

impl CallLog {
    fn push(&self, call: EngineCall) {
        self.0.lock().unwrap().push(call);
    }

    fn count(&self, call: EngineCall) -> usize {
        self.0.lock().unwrap().iter().filter(|c| **c == call).count()
    }
}

struct MockEngine {
    log: CallLog,
}

impl SpeechEngine for MockEngine {
    fn start(&mut self, _config: &relisten::config::EngineConfig) -> anyhow::Result<()> {
        self.log.push(EngineCall::Start);
        Ok(())
    }

    fn cancel(&mut self) -> anyhow::Result<()> {
        self.log.push(EngineCall::Cancel);
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> anyhow::Result<()> {
        self.log.push(EngineCall::Destroy);
        Ok(())
    }
}

struct MockFactory {
    log: CallLog,
    events: Arc<Mutex<Option<EngineEventSender>>>,
}

impl EngineFactory for MockFactory {
    fn is_available(&self) -> bool {
        true
    }

    fn build(&mut self, events: EngineEventSender) -> anyhow::Result<Box<dyn SpeechEngine>> {
        self.log.push(EngineCall::Build);
        *self.events.lock().unwrap() = Some(events);
        Ok(Box::new(MockEngine {
            log: self.log.clone(),
        }))
    }
}

struct FlagAuthorization(Arc<AtomicBool>);

impl CaptureAuthorization for FlagAuthorization {
    fn is_authorized(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    handle: SessionHandle,
    notices: mpsc::UnboundedReceiver<SessionNotice>,
    commands: CommandReceiver,
    log: CallLog,
    events: Arc<Mutex<Option<EngineEventSender>>>,
    authorized: Arc<AtomicBool>,
}

impl Harness {
    fn spawn(config: SessionConfig) -> Self {
        let log = CallLog::default();
        let events = Arc::new(Mutex::new(None));
        let authorized = Arc::new(AtomicBool::new(true));

        let factory = MockFactory {
            log: log.clone(),
            events: events.clone(),
        };
        let (handle, notices, commands) = SessionManager::spawn(
            Box::new(factory),
            Box::new(FlagAuthorization(authorized.clone())),
            config,
        );

        Self {
            handle,
            notices,
            commands,
            log,
            events,
            authorized,
        }
    }

    /// Push an event as the engine adapter would.
    fn emit(&self, event: EngineEvent) {
        self.events
            .lock()
            .unwrap()
            .as_ref()
            .expect("engine not built yet")
            .send(event)
            .expect("session actor gone");
    }

    fn starts(&self) -> usize {
        self.log.count(EngineCall::Start)
    }

    fn builds(&self) -> usize {
        self.log.count(EngineCall::Build)
    }

    fn drain_notices(&mut self) -> Vec<SessionNotice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            notices.push(notice);
        }
        notices
    }

    fn drain_commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            commands.push(command);
        }
        commands
    }
}

/// Short, strictly-growing delays so escalation is observable.
fn test_config() -> SessionConfig {
    SessionConfig {
        restart: RestartConfig {
            base_delay_ms: 150,
            busy_reset_delay_ms: 200,
            busy_backoff_ceiling_ms: 1000,
            busy_backoff_growth: 2.0,
        },
        ..Default::default()
    }
}

/// Let the session actor drain its mailbox.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

/// Spawn, set up, and start listening.
async fn listening(config: SessionConfig) -> Harness {
    let harness = Harness::spawn(config);
    harness.handle.setup().unwrap();
    harness.handle.start_listening().unwrap();
    settle().await;
    assert_eq!(harness.handle.state(), SessionState::Listening);
    assert_eq!(harness.starts(), 1);
    harness
}

fn final_text(text: &str) -> EngineEvent {
    EngineEvent::Final {
        text: text.to_string(),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn final_result_is_delivered_and_session_restarts() {
    let mut harness = listening(test_config()).await;

    harness.emit(final_text("open camera"));
    settle().await;

    // Owner sees the result, downstream gets the command
    assert!(harness.drain_notices().contains(&SessionNotice::Result {
        text: "open camera".to_string()
    }));
    assert_eq!(harness.drain_commands(), vec!["open camera".to_string()]);

    // The restart has not fired yet
    assert_eq!(harness.starts(), 1);

    advance(150).await;
    assert_eq!(harness.starts(), 2, "restart after the base delay");
    assert_eq!(harness.handle.state(), SessionState::Listening);

    harness.handle.destroy().unwrap();
}

#[tokio::test(start_paused = true)]
async fn busy_errors_escalate_with_full_teardown() {
    let mut harness = listening(test_config()).await;

    // First busy fault: teardown, rebuild after 200 ms
    harness.emit(EngineEvent::Error {
        code: EngineErrorCode::RecognizerBusy,
    });
    settle().await;
    assert_eq!(harness.handle.state(), SessionState::Ready);
    assert!(harness.log.count(EngineCall::Destroy) >= 1);

    advance(199).await;
    assert_eq!(harness.builds(), 1, "rebuild must wait the full delay");
    advance(1).await;
    assert_eq!(harness.builds(), 2);
    assert_eq!(harness.starts(), 2);
    assert_eq!(harness.handle.state(), SessionState::Listening);

    // Second busy fault: delay doubles to 400 ms
    harness.emit(EngineEvent::Error {
        code: EngineErrorCode::RecognizerBusy,
    });
    settle().await;
    advance(399).await;
    assert_eq!(harness.builds(), 2);
    advance(1).await;
    assert_eq!(harness.builds(), 3);
    assert_eq!(harness.starts(), 3);

    // Third busy fault: 800 ms, still under the 1000 ms ceiling
    harness.emit(EngineEvent::Error {
        code: EngineErrorCode::RecognizerBusy,
    });
    settle().await;
    advance(799).await;
    assert_eq!(harness.builds(), 3);
    advance(1).await;
    assert_eq!(harness.builds(), 4);
    assert_eq!(harness.starts(), 4);

    assert_eq!(harness.handle.status().busy_failures, 3);
    harness.drain_notices();
    harness.handle.destroy().unwrap();
}

#[tokio::test(start_paused = true)]
async fn permission_error_parks_in_ready_without_restart() {
    let mut harness = listening(test_config()).await;

    harness.emit(EngineEvent::Error {
        code: EngineErrorCode::InsufficientPermissions,
    });
    settle().await;

    assert_eq!(harness.handle.state(), SessionState::Ready);
    assert!(harness
        .drain_notices()
        .iter()
        .any(|n| matches!(n, SessionNotice::Error { message } if message.contains("permissions"))));

    // No restart, ever
    advance(10_000).await;
    assert_eq!(harness.starts(), 1);

    // The caller may retry explicitly
    harness.handle.start_listening().unwrap();
    settle().await;
    assert_eq!(harness.starts(), 2);

    harness.handle.destroy().unwrap();
}

#[tokio::test(start_paused = true)]
async fn duplicate_command_within_window_is_suppressed() {
    let mut harness = listening(test_config()).await;

    harness.emit(final_text("red"));
    settle().await;
    advance(500).await;
    harness.emit(final_text("red"));
    settle().await;

    assert_eq!(
        harness.drain_commands(),
        vec!["red".to_string()],
        "exactly one downstream delivery inside the window"
    );

    // Outside the window the same text is a new command
    advance(1000).await;
    harness.emit(final_text("red"));
    settle().await;
    assert_eq!(harness.drain_commands(), vec!["red".to_string()]);

    // The owner still saw all three results
    let results = harness
        .drain_notices()
        .into_iter()
        .filter(|n| matches!(n, SessionNotice::Result { .. }))
        .count();
    assert_eq!(results, 3);

    harness.handle.destroy().unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_the_pending_restart() {
    let mut harness = listening(test_config()).await;

    harness.emit(final_text("go"));
    settle().await;
    assert!(harness.handle.status().restart_pending);

    harness.handle.stop_listening().unwrap();
    settle().await;
    assert_eq!(harness.handle.state(), SessionState::Ready);
    assert!(!harness.handle.status().restart_pending);

    advance(60_000).await;
    assert_eq!(harness.starts(), 1, "no start after an explicit stop");

    harness.handle.start_listening().unwrap();
    settle().await;
    assert_eq!(harness.starts(), 2);

    harness.drain_notices();
    harness.handle.destroy().unwrap();
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test(start_paused = true)]
async fn rearming_keeps_a_single_pending_restart() {
    let harness = listening(test_config()).await;

    // End of speech and the final both arm; the final's ticket replaces
    // the earlier one.
    harness.emit(EngineEvent::EndOfSpeech);
    harness.emit(final_text("one"));
    settle().await;

    advance(150).await;
    assert_eq!(harness.starts(), 2, "exactly one restart fires");

    advance(10_000).await;
    assert_eq!(harness.starts(), 2, "no second ticket was left behind");

    harness.handle.destroy().unwrap();
}

#[tokio::test(start_paused = true)]
async fn no_restart_fires_after_destroy() {
    let harness = listening(test_config()).await;

    harness.emit(final_text("go"));
    settle().await;

    harness.handle.destroy().unwrap();
    settle().await;
    assert_eq!(harness.handle.state(), SessionState::Destroyed);

    advance(60_000).await;
    assert_eq!(harness.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_engine_error_after_stop_does_not_restart() {
    let harness = listening(test_config()).await;

    harness.handle.stop_listening().unwrap();
    settle().await;
    assert_eq!(harness.handle.state(), SessionState::Ready);

    // The cancelled activation reports its terminal error late
    harness.emit(EngineEvent::Error {
        code: EngineErrorCode::Client,
    });
    settle().await;
    advance(10_000).await;

    assert_eq!(harness.starts(), 1);
    assert_eq!(harness.builds(), 1, "a stale client error must not rebuild");
    assert_eq!(harness.handle.state(), SessionState::Ready);

    harness.handle.destroy().unwrap();
}

#[tokio::test(start_paused = true)]
async fn revoked_authorization_parks_the_restart() {
    let mut harness = listening(test_config()).await;

    harness.emit(final_text("go"));
    settle().await;

    // Authorization disappears while the restart is pending
    harness.authorized.store(false, Ordering::SeqCst);
    advance(150).await;

    assert_eq!(harness.handle.state(), SessionState::Ready);
    assert_eq!(harness.starts(), 1);
    assert!(harness
        .drain_notices()
        .iter()
        .any(|n| matches!(n, SessionNotice::Error { message } if message.contains("permission"))));

    harness.handle.destroy().unwrap();
}

#[tokio::test(start_paused = true)]
async fn busy_backoff_resets_after_a_result() {
    let harness = listening(test_config()).await;

    harness.emit(EngineEvent::Error {
        code: EngineErrorCode::RecognizerBusy,
    });
    settle().await;
    advance(200).await;
    assert_eq!(harness.starts(), 2);
    assert_eq!(harness.handle.status().busy_failures, 1);

    harness.emit(final_text("recovered"));
    settle().await;
    assert_eq!(harness.handle.status().busy_failures, 0);

    // The next busy fault starts the schedule over at the base delay
    advance(150).await; // let the pending result-restart fire first
    harness.emit(EngineEvent::Error {
        code: EngineErrorCode::RecognizerBusy,
    });
    settle().await;
    advance(200).await;
    assert_eq!(harness.starts(), 4, "reset schedule waits 200 ms, not 400 ms");

    harness.handle.destroy().unwrap();
}

#[tokio::test(start_paused = true)]
async fn partials_flow_while_listening_and_never_reach_commands() {
    let mut harness = listening(test_config()).await;

    harness.emit(EngineEvent::Partial {
        text: "open".to_string(),
    });
    harness.emit(EngineEvent::Partial {
        text: "open cam".to_string(),
    });
    harness.emit(EngineEvent::RmsChanged { level: 4.2 });
    settle().await;

    let notices = harness.drain_notices();
    let partials: Vec<_> = notices
        .iter()
        .filter(|n| matches!(n, SessionNotice::Partial { .. }))
        .collect();
    assert_eq!(partials.len(), 2);
    assert!(notices
        .iter()
        .any(|n| matches!(n, SessionNotice::RmsLevel { .. })));
    assert!(harness.drain_commands().is_empty());

    harness.handle.destroy().unwrap();
}
