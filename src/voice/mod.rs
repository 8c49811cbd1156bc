//! Voices and the heuristics used to describe them
//!
//! Engines only report a name and a language tag. Gender, accent and
//! quality are guessed from those once per load cycle.

pub mod classify;
pub mod loader;
pub mod profile;

pub use classify::{classify, default_voice, preferred_voice, resolve_voice, Tiers};
pub use loader::{LoadStatus, RetryPolicy, VoiceLoader};
pub use profile::LanguageProfile;

use crate::engine::RawVoice;
use crate::{ReadAloudError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const MALE_KEYWORDS: &[&str] = &[
    "male", "man", "david", "mark", "alex", "daniel", "james", "john", "michael", "robert",
    "william",
];
const FEMALE_KEYWORDS: &[&str] = &[
    "female", "woman", "zira", "hazel", "susan", "samantha", "victoria", "karen", "sarah", "emma",
    "olivia",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Accent {
    Us,
    Uk,
    Au,
    In,
    Ca,
}

/// Rough quality tier guessed from the voice name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Standard,
    Premium,
    Neural,
}

/// Where speech is synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// The host platform's synthesizer
    Native,
    ElevenLabs,
    Google,
    Amazon,
    Azure,
}

impl Provider {
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Native => "Native",
            Provider::ElevenLabs => "ElevenLabs",
            Provider::Google => "Google TTS",
            Provider::Amazon => "Amazon Polly",
            Provider::Azure => "Azure TTS",
        }
    }
}

impl FromStr for Provider {
    type Err = ReadAloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "browser" | "system" => Ok(Provider::Native),
            "elevenlabs" => Ok(Provider::ElevenLabs),
            "google" => Ok(Provider::Google),
            "amazon" | "polly" => Ok(Provider::Amazon),
            "azure" => Ok(Provider::Azure),
            other => Err(ReadAloudError::Config(format!("Unknown provider: {}", other))),
        }
    }
}

impl FromStr for Gender {
    type Err = ReadAloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "neutral" => Ok(Gender::Neutral),
            other => Err(ReadAloudError::Config(format!("Unknown gender: {}", other))),
        }
    }
}

impl FromStr for Accent {
    type Err = ReadAloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "us" => Ok(Accent::Us),
            "uk" | "gb" => Ok(Accent::Uk),
            "au" => Ok(Accent::Au),
            "in" => Ok(Accent::In),
            "ca" => Ok(Accent::Ca),
            other => Err(ReadAloudError::Config(format!("Unknown accent: {}", other))),
        }
    }
}

/// A voice offered by the engine, with inferred attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub lang: String,
    pub local_service: bool,
    pub default: bool,
    pub gender: Gender,
    pub accent: Accent,
    pub quality: Quality,
    pub provider: Provider,
}

impl Voice {
    /// Describe a raw engine voice. `index` is its position in the
    /// snapshot, used when the engine gives no identifier.
    pub fn from_raw(raw: &RawVoice, index: usize) -> Self {
        let id = if raw.id.is_empty() {
            format!("native-{}", index)
        } else {
            raw.id.clone()
        };

        Self {
            id,
            name: raw.name.clone(),
            lang: raw.lang.clone(),
            local_service: raw.local_service,
            default: raw.default,
            gender: detect_gender(&raw.name),
            accent: detect_accent(&raw.lang, &raw.name),
            quality: detect_quality(&raw.name, raw.local_service),
            provider: Provider::Native,
        }
    }

    /// Describe a whole snapshot
    pub fn from_snapshot(raw: &[RawVoice]) -> Vec<Voice> {
        raw.iter()
            .enumerate()
            .map(|(i, v)| Voice::from_raw(v, i))
            .collect()
    }

    /// The engine-facing view of this voice
    pub fn to_raw(&self) -> RawVoice {
        RawVoice {
            id: if self.id.starts_with("native-") {
                String::new()
            } else {
                self.id.clone()
            },
            name: self.name.clone(),
            lang: self.lang.clone(),
            local_service: self.local_service,
            default: self.default,
        }
    }

    /// Same synthesis profile, as far as deduplication is concerned
    pub fn same_profile(&self, other: &Voice) -> bool {
        self.name == other.name && self.lang == other.lang
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.lang)?;
        if self.default {
            write!(f, " [default]")?;
        }
        Ok(())
    }
}

/// Split a language tag into lowercase subtags
pub(crate) fn subtags(lang: &str) -> Vec<String> {
    lang.to_ascii_lowercase()
        .split(|c| c == '-' || c == '_')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn detect_gender(name: &str) -> Gender {
    // Whole words only: "female" contains "male", "samantha" contains "man"
    let name = name.to_lowercase();
    let words: Vec<&str> = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| MALE_KEYWORDS.contains(w)) {
        Gender::Male
    } else if words.iter().any(|w| FEMALE_KEYWORDS.contains(w)) {
        Gender::Female
    } else {
        Gender::Neutral
    }
}

pub fn detect_accent(lang: &str, name: &str) -> Accent {
    let region = subtags(lang).get(1).cloned().unwrap_or_default();
    let name = name.to_lowercase();

    if region == "gb" || region == "uk" || name.contains("british") || name.contains(" uk") {
        Accent::Uk
    } else if region == "au" || name.contains("australian") {
        Accent::Au
    } else if region == "in" || name.contains("indian") {
        Accent::In
    } else if region == "ca" || name.contains("canadian") {
        Accent::Ca
    } else {
        Accent::Us
    }
}

pub fn detect_quality(name: &str, local_service: bool) -> Quality {
    let name = name.to_lowercase();
    if name.contains("neural") || name.contains("natural") {
        Quality::Neural
    } else if name.contains("google")
        || name.contains("premium")
        || name.contains("enhanced")
        || !local_service
    {
        Quality::Premium
    } else {
        Quality::Standard
    }
}
