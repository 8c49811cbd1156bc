//! Speech engine abstraction
//!
//! The host synthesizer is the only thing that actually produces audio.
//! Everything above this module talks to it through [`SpeechEngine`],
//! and hears back from it through [`EngineEvent`]s drained by the owner's
//! event loop.

pub mod memory;
pub mod native;

pub use memory::MemoryEngine;
pub use native::NativeEngine;

use crate::voice::Provider;
use crate::{ReadAloudError, Result};
use log::info;
use std::fmt;

/// Identifier handed to the engine with every utterance and echoed back
/// in its events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtteranceId(pub u64);

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A voice exactly as the engine reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVoice {
    /// Engine-specific identifier (may be empty)
    pub id: String,
    /// Display name, e.g. "Google US English"
    pub name: String,
    /// Language tag, e.g. "en-US"
    pub lang: String,
    /// Synthesized on-device rather than by a network service
    pub local_service: bool,
    /// The engine's own default voice
    pub default: bool,
}

impl RawVoice {
    pub fn new(name: &str, lang: &str) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            lang: lang.to_string(),
            local_service: true,
            default: false,
        }
    }
}

/// One text-to-speech request
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    /// Voice to use; `None` leaves the engine on its current voice
    pub voice: Option<RawVoice>,
    /// 0.1 - 2.0, 1.0 is normal
    pub rate: f32,
    /// 0.0 - 2.0, 1.0 is normal
    pub pitch: f32,
    /// 0.0 - 1.0
    pub volume: f32,
    pub lang: String,
}

/// Lifecycle notifications from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started(UtteranceId),
    Ended(UtteranceId),
    Paused(UtteranceId),
    Resumed(UtteranceId),
    /// The engine reached the start of the next word
    Boundary { id: UtteranceId, char_index: usize },
    Error { id: UtteranceId, code: ErrorCode },
    /// The engine's voice list changed
    VoicesChanged,
}

/// Session error codes reported by engines
///
/// The string forms are the ones used by the Web Speech API, which most
/// engines mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    NotAllowed,
    Network,
    SynthesisFailed,
    LanguageUnavailable,
    VoiceUnavailable,
    Interrupted,
    Canceled,
    Other(String),
}

impl ErrorCode {
    /// Parse an engine error string
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "not-allowed" | "permission-denied" => ErrorCode::NotAllowed,
            "network" => ErrorCode::Network,
            "synthesis-failed" | "synthesis-unavailable" | "audio-busy" | "audio-hardware" => {
                ErrorCode::SynthesisFailed
            }
            "language-unavailable" | "language-not-supported" => ErrorCode::LanguageUnavailable,
            "voice-unavailable" => ErrorCode::VoiceUnavailable,
            "interrupted" => ErrorCode::Interrupted,
            "canceled" | "cancelled" => ErrorCode::Canceled,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    /// Code string as reported by the engine
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::NotAllowed => "not-allowed",
            ErrorCode::Network => "network",
            ErrorCode::SynthesisFailed => "synthesis-failed",
            ErrorCode::LanguageUnavailable => "language-unavailable",
            ErrorCode::VoiceUnavailable => "voice-unavailable",
            ErrorCode::Interrupted => "interrupted",
            ErrorCode::Canceled => "canceled",
            ErrorCode::Other(code) => code,
        }
    }

    /// Interruptions are the expected result of an intentional stop
    pub fn is_benign(&self) -> bool {
        matches!(self, ErrorCode::Interrupted | ErrorCode::Canceled)
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCode::NotAllowed => "Speech not allowed. Please check permissions.",
            ErrorCode::Network => "Network error. Check your connection.",
            ErrorCode::SynthesisFailed => "Speech synthesis failed. Try another voice.",
            ErrorCode::LanguageUnavailable => {
                "Language not supported. Please try a different voice."
            }
            ErrorCode::VoiceUnavailable => "The selected voice is no longer available.",
            ErrorCode::Interrupted | ErrorCode::Canceled => "Speech was stopped.",
            ErrorCode::Other(_) => "An error occurred during speech synthesis.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host speech synthesizer
///
/// Engines are driven from a single thread. Lifecycle callbacks are
/// queued by the engine and handed over by [`SpeechEngine::poll_events`].
pub trait SpeechEngine {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Current voice snapshot. May be empty while the engine is still
    /// populating it.
    fn voices(&mut self) -> Result<Vec<RawVoice>>;

    /// Start speaking an utterance
    fn submit(&mut self, utterance: &Utterance) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Cancel everything in flight. Must succeed when nothing is active.
    fn cancel(&mut self) -> Result<()>;

    fn is_speaking(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Take every event queued since the last call
    fn poll_events(&mut self) -> Vec<EngineEvent>;

    /// Wake the audio subsystem after a user gesture.
    ///
    /// Some engines only populate voices once something has been spoken.
    fn prime(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: SpeechEngine + ?Sized> SpeechEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn voices(&mut self) -> Result<Vec<RawVoice>> {
        (**self).voices()
    }

    fn submit(&mut self, utterance: &Utterance) -> Result<()> {
        (**self).submit(utterance)
    }

    fn pause(&mut self) -> Result<()> {
        (**self).pause()
    }

    fn resume(&mut self) -> Result<()> {
        (**self).resume()
    }

    fn cancel(&mut self) -> Result<()> {
        (**self).cancel()
    }

    fn is_speaking(&self) -> bool {
        (**self).is_speaking()
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        (**self).poll_events()
    }

    fn prime(&mut self) -> Result<()> {
        (**self).prime()
    }
}

/// Create the engine for a provider
///
/// Only the native engine is functional. Cloud providers are listed so
/// that configuration naming them fails with a clear message.
pub fn create_engine(provider: Provider) -> Result<Box<dyn SpeechEngine>> {
    match provider {
        Provider::Native => {
            info!(
                "Creating native speech engine for platform: {}",
                std::env::consts::OS
            );
            match NativeEngine::new() {
                Ok(engine) => {
                    info!("✓ Successfully initialized native TTS engine");
                    Ok(Box::new(engine))
                }
                Err(e) => Err(ReadAloudError::Unavailable(format!(
                    "No speech engine available on '{}'. On Linux install speech-dispatcher \
                     (sudo apt install speech-dispatcher). Error: {}",
                    std::env::consts::OS,
                    e
                ))),
            }
        }
        other => Err(ReadAloudError::Unsupported(format!(
            "{} integration not implemented",
            other.display_name()
        ))),
    }
}
