//! Engine error classification and retry backoff
//!
//! Maps opaque engine error codes to the categories the session reacts to,
//! and computes the escalating delay used when the platform keeps reporting
//! a busy recogniser.

use crate::engine::EngineErrorCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the session does about an engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Terminal for the session; no restart is armed
    Fatal,
    /// Terminal for this attempt only; the session parks in `Ready` so the
    /// caller can retry once authorization is granted
    PermissionDenied,
    /// The recogniser is wedged; full teardown and rebuild with backoff
    Busy,
    /// Common transient outcome; lightweight restart at the base delay
    Recoverable,
}

/// Classify an engine error code.
///
/// Busy-class faults need a fresh engine instance: a wedged recogniser
/// keeps rejecting activations until it is destroyed and rebuilt.
/// Unclassified codes are treated as recoverable.
pub fn classify(code: EngineErrorCode) -> ErrorCategory {
    match code {
        EngineErrorCode::LanguageNotSupported | EngineErrorCode::LanguageUnavailable => {
            ErrorCategory::Fatal
        }
        EngineErrorCode::InsufficientPermissions => ErrorCategory::PermissionDenied,
        EngineErrorCode::RecognizerBusy
        | EngineErrorCode::Client
        | EngineErrorCode::TooManyRequests => ErrorCategory::Busy,
        EngineErrorCode::NoMatch | EngineErrorCode::SpeechTimeout => ErrorCategory::Recoverable,
        _ => ErrorCategory::Recoverable,
    }
}

/// Escalating delay for consecutive busy-class faults.
///
/// `delay = min(ceiling, base * growth^n)` where `n` counts consecutive
/// busy faults before this one. The counter resets on the next non-busy
/// outcome (a final result or a recoverable error).
#[derive(Debug, Clone)]
pub struct BackoffCounter {
    count: u32,
    base_ms: u64,
    ceiling_ms: u64,
    growth: f64,
}

impl BackoffCounter {
    /// Create a counter with the given schedule.
    pub fn new(base_ms: u64, ceiling_ms: u64, growth: f64) -> Self {
        Self {
            count: 0,
            base_ms,
            ceiling_ms,
            growth,
        }
    }

    /// Consecutive busy faults recorded since the last reset.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Record one busy fault and return the delay to wait before rebuilding.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.count);
        self.count = self.count.saturating_add(1);
        delay
    }

    /// Reset after a final result or recoverable error.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    fn delay_for(&self, consecutive: u32) -> Duration {
        let exponent = consecutive.min(16); // growth^17 already dwarfs any ceiling
        let scaled = (self.base_ms as f64) * self.growth.powi(exponent as i32);
        let capped = scaled.min(self.ceiling_ms as f64);
        Duration::from_millis(capped as u64)
    }
}
