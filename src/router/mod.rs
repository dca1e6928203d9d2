//! Result routing and command delivery
//!
//! Shapes the recognised-text stream for consumption: final results are
//! surfaced to the owner and, after duplicate suppression, delivered on the
//! downstream command channel; partial hypotheses go to the owner only and
//! are never debounced (they are presentation-only and expected to repeat
//! as the engine refines them).

pub mod debounce;

pub use debounce::{CommandDebouncer, DebounceDecision};

use crate::session::SessionNotice;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Downstream command stream for an external command interpreter.
///
/// Clone this to consume debounced commands in another thread. Delivery is
/// strictly in order relative to other commands from the same session.
pub type CommandReceiver = crossbeam_channel::Receiver<String>;

/// Routes recognised text to the owner and the command channel.
pub struct ResultRouter {
    notices: mpsc::UnboundedSender<SessionNotice>,
    commands: crossbeam_channel::Sender<String>,
    debouncer: CommandDebouncer,
}

impl ResultRouter {
    /// Create a router emitting owner notices on `notices`.
    ///
    /// Returns the router and the downstream command receiver.
    pub fn new(
        debounce_window: Duration,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> (Self, CommandReceiver) {
        let (commands, receiver) = crossbeam_channel::unbounded();
        (
            Self {
                notices,
                commands,
                debouncer: CommandDebouncer::new(debounce_window),
            },
            receiver,
        )
    }

    /// Route a committed final result.
    pub fn route_final(&mut self, text: String, now: Instant) {
        let _ = self.notices.send(SessionNotice::Result { text: text.clone() });

        match self.debouncer.accept(&text, now) {
            DebounceDecision::Deliver => {
                if self.commands.send(text).is_err() {
                    tracing::debug!("No command consumer attached, dropping command");
                }
            }
            DebounceDecision::Suppress => {
                tracing::debug!("Duplicate command ignored: {}", text);
            }
        }
    }

    /// Route an in-progress hypothesis. Partials are never debounced.
    pub fn route_partial(&self, text: String) {
        let _ = self.notices.send(SessionNotice::Partial { text });
    }
}
