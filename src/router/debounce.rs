//! Duplicate-command suppression
//!
//! A restart race can hand the same utterance to the session twice (the
//! engine re-delivers it across the activation boundary). The debouncer
//! drops a command identical to the previous one when it arrives inside a
//! configurable window.

use std::time::{Duration, Instant};

/// Outcome of offering a command to the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDecision {
    /// Forward the command downstream
    Deliver,
    /// Drop it as a duplicate
    Suppress,
}

/// Suppresses a command string that repeats within the window.
///
/// The record is overwritten on every delivered command; a suppressed
/// duplicate does not refresh the window.
pub struct CommandDebouncer {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl CommandDebouncer {
    /// Create a debouncer with the given suppression window.
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Decide whether `text` arriving at `now` should be delivered.
    pub fn accept(&mut self, text: &str, now: Instant) -> DebounceDecision {
        if let Some((last_text, last_at)) = &self.last {
            if last_text == text && now.duration_since(*last_at) < self.window {
                return DebounceDecision::Suppress;
            }
        }

        self.last = Some((text.to_string(), now));
        DebounceDecision::Deliver
    }

    /// Forget the last delivered command.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
