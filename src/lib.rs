//! readaloud - Read text aloud
//!
//! Loads the voices offered by the platform's speech synthesizer, ranks
//! them for the target language, and drives one utterance at a time with
//! pause, resume, progress and word highlighting.

pub mod clipboard;
pub mod engine;
pub mod error;
pub mod input;
pub mod session;
pub mod state;
pub mod terminal;
pub mod voice;

pub use error::{ReadAloudError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "readaloud";
