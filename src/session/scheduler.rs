//! Single-slot restart scheduling
//!
//! Owns the one pending restart ticket a session may have. Arming replaces
//! any outstanding ticket, and every fire carries a generation token so the
//! manager can discard a ticket that was superseded or cancelled after its
//! timer task had already fired.

use super::manager::Mail;
use super::state::RestartKind;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The session's single restart-timer slot.
pub(crate) struct RestartScheduler {
    tx: mpsc::UnboundedSender<Mail>,
    generation: u64,
    pending: Option<PendingTicket>,
}

struct PendingTicket {
    generation: u64,
    task: JoinHandle<()>,
}

impl RestartScheduler {
    pub fn new(tx: mpsc::UnboundedSender<Mail>) -> Self {
        Self {
            tx,
            generation: 0,
            pending: None,
        }
    }

    /// Arm a restart after `delay`, replacing any pending ticket.
    pub fn arm(&mut self, delay: Duration, kind: RestartKind) {
        self.cancel_pending();

        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Mail::RestartElapsed { generation, kind });
        });

        self.pending = Some(PendingTicket { generation, task });
        tracing::debug!("Restart {:?} armed in {:?} (ticket {})", kind, delay, generation);
    }

    /// Cancel any pending ticket. Safe to call with nothing pending.
    pub fn cancel_pending(&mut self) {
        if let Some(ticket) = self.pending.take() {
            ticket.task.abort();
            tracing::debug!("Restart ticket {} cancelled", ticket.generation);
        }
    }

    /// Consume a fired ticket. Returns false for a stale generation, i.e.
    /// a fire that raced with cancellation or replacement.
    pub fn acknowledge(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(ticket) if ticket.generation == generation => {
                self.pending = None;
                true
            }
            _ => {
                tracing::debug!("Stale restart ticket {} ignored", generation);
                false
            }
        }
    }

    /// Whether a restart is currently armed.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for RestartScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
