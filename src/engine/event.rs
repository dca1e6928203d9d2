//! Engine event and error code definitions
//!
//! Events arrive asynchronously from the engine's own execution context and
//! are serialized onto the session mailbox before being processed.

use serde::{Deserialize, Serialize};

/// An asynchronous event reported by the recognition engine.
///
/// One activation produces a sequence such as `Ready`, `SpeechBegan`,
/// several `Partial`s, then either `Final`/`EndOfSpeech` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The engine is ready for the user to start speaking
    Ready,
    /// The user has started to speak
    SpeechBegan,
    /// The input sound level changed (RMS dB)
    RmsChanged { level: f32 },
    /// An in-progress, possibly-revised hypothesis
    Partial { text: String },
    /// A committed recognition result for one utterance
    Final { text: String },
    /// The user stopped speaking; a final result may still follow
    EndOfSpeech,
    /// The activation failed
    Error { code: EngineErrorCode },
}

/// Error codes reported by the recognition engine.
///
/// The numeric values follow the platform recogniser's error constants so
/// adapters can map raw codes directly with [`EngineErrorCode::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorCode {
    /// Network operation timed out
    NetworkTimeout,
    /// Other network-related error
    Network,
    /// Audio recording error
    Audio,
    /// Server sent an error status
    Server,
    /// Client-side fault in the recogniser
    Client,
    /// No speech input before the engine gave up
    SpeechTimeout,
    /// No recognition result matched the audio
    NoMatch,
    /// The recognition service is busy with another activation
    RecognizerBusy,
    /// Capture permission is missing or was revoked
    InsufficientPermissions,
    /// The service is throttling requests
    TooManyRequests,
    /// The server disconnected mid-activation
    ServerDisconnected,
    /// The requested language is not supported by the engine
    LanguageNotSupported,
    /// The requested language is supported but not currently available
    LanguageUnavailable,
    /// A code this crate does not know about
    Other(i32),
}

impl EngineErrorCode {
    /// Map a raw platform error code to a known variant.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::NetworkTimeout,
            2 => Self::Network,
            3 => Self::Audio,
            4 => Self::Server,
            5 => Self::Client,
            6 => Self::SpeechTimeout,
            7 => Self::NoMatch,
            8 => Self::RecognizerBusy,
            9 => Self::InsufficientPermissions,
            10 => Self::TooManyRequests,
            11 => Self::ServerDisconnected,
            12 => Self::LanguageNotSupported,
            13 => Self::LanguageUnavailable,
            other => Self::Other(other),
        }
    }

    /// The raw platform error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::NetworkTimeout => 1,
            Self::Network => 2,
            Self::Audio => 3,
            Self::Server => 4,
            Self::Client => 5,
            Self::SpeechTimeout => 6,
            Self::NoMatch => 7,
            Self::RecognizerBusy => 8,
            Self::InsufficientPermissions => 9,
            Self::TooManyRequests => 10,
            Self::ServerDisconnected => 11,
            Self::LanguageNotSupported => 12,
            Self::LanguageUnavailable => 13,
            Self::Other(code) => *code,
        }
    }

    /// A human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Network timeout",
            Self::Network => "Network error",
            Self::Audio => "Audio recording error",
            Self::Server => "Server error",
            Self::Client => "Client error",
            Self::SpeechTimeout => "No speech input",
            Self::NoMatch => "No match",
            Self::RecognizerBusy => "Recognizer busy",
            Self::InsufficientPermissions => "Insufficient permissions",
            Self::TooManyRequests => "Too many requests",
            Self::ServerDisconnected => "Server disconnected",
            Self::LanguageNotSupported => "Language not supported",
            Self::LanguageUnavailable => "Language unavailable",
            Self::Other(_) => "Unknown error",
        }
    }

    /// The message surfaced through error notices, e.g. `"No match (code 7)"`.
    pub fn message(&self) -> String {
        format!("{} (code {})", self.description(), self.code())
    }
}
