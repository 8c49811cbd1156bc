//! Error types for readaloud

use crate::engine::ErrorCode;
use std::io;
use thiserror::Error;

/// Main error type for readaloud
#[derive(Error, Debug)]
pub enum ReadAloudError {
    /// The host has no usable speech engine at all
    #[error("Speech synthesis unavailable: {0}")]
    Unavailable(String),

    #[error("Speech engine error: {0}")]
    Engine(String),

    #[error("Please enter some text to speak")]
    NoText,

    #[error("Text is too long ({len} characters). Maximum {max} characters allowed.")]
    TextTooLong { len: usize, max: usize },

    #[error("Voice not available: {0}")]
    VoiceUnavailable(String),

    /// Error reported by the engine while an utterance was in flight
    #[error("{}", .0.user_message())]
    Session(ErrorCode),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for readaloud operations
pub type Result<T> = std::result::Result<T, ReadAloudError>;

impl ReadAloudError {
    /// Whether this error should be shown to the user.
    ///
    /// Interruptions caused by an intentional stop are expected.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, ReadAloudError::Session(code) if code.is_benign())
    }
}

impl From<String> for ReadAloudError {
    fn from(s: String) -> Self {
        ReadAloudError::Other(s)
    }
}

impl From<&str> for ReadAloudError {
    fn from(s: &str) -> Self {
        ReadAloudError::Other(s.to_string())
    }
}
