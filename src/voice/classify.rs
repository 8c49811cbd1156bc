//! Voice tiering and selection
//!
//! Everything here is a pure function of the voice snapshot and the
//! target language, so the same input always yields the same order.

use super::profile::{has_quality_keyword, LanguageProfile};
use super::{Accent, Gender, Voice};
use crate::{ReadAloudError, Result};
use log::{debug, warn};
use serde::Serialize;

/// Voices grouped by how well they fit the target language
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tiers {
    /// Voices in the target language
    pub primary: Vec<Voice>,
    /// Target-language voices from quality vendors not already in `primary`
    pub secondary: Vec<Voice>,
    /// Related or commonly available languages, only when `primary` is empty
    pub fallback: Vec<Voice>,
}

impl Tiers {
    /// All tiers in priority order
    pub fn ranked(&self) -> Vec<Voice> {
        self.primary
            .iter()
            .chain(&self.secondary)
            .chain(&self.fallback)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len() + self.fallback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sort a voice snapshot into tiers for a target language
///
/// Entries are deduplicated by (name, language) across all tiers; the
/// copy in the higher tier is the one kept.
pub fn classify(voices: &[Voice], target: &str) -> Tiers {
    let profile = LanguageProfile::for_tag(target);
    let mut kept: Vec<&Voice> = Vec::new();

    let primary = take_unseen(
        voices
            .iter()
            .filter(|v| profile.matches_voice(&v.name, &v.lang)),
        &mut kept,
    );

    let secondary = take_unseen(
        voices
            .iter()
            .filter(|v| profile.matches_lang(&v.lang) && has_quality_keyword(&v.name)),
        &mut kept,
    );

    let fallback = if primary.is_empty() {
        take_unseen(
            voices
                .iter()
                .filter(|v| profile.matches_fallback(&v.name, &v.lang)),
            &mut kept,
        )
    } else {
        Vec::new()
    };

    debug!(
        "Classified {} voices for {}: {} primary, {} secondary, {} fallback",
        voices.len(),
        target,
        primary.len(),
        secondary.len(),
        fallback.len()
    );

    Tiers {
        primary,
        secondary,
        fallback,
    }
}

/// Keep candidates whose (name, language) pair has not been seen yet
fn take_unseen<'a>(
    candidates: impl Iterator<Item = &'a Voice>,
    kept: &mut Vec<&'a Voice>,
) -> Vec<Voice> {
    let mut tier = Vec::new();
    for voice in candidates {
        if kept.iter().any(|k| k.same_profile(voice)) {
            continue;
        }
        kept.push(voice);
        tier.push(voice.clone());
    }
    tier
}

/// Voice to select automatically, if any
pub fn default_voice(tiers: &Tiers) -> Option<&Voice> {
    tiers.primary.first()
}

/// Primary voice closest to the user's accent and gender preferences
pub fn preferred_voice(
    tiers: &Tiers,
    accent: Option<Accent>,
    gender: Option<Gender>,
) -> Option<&Voice> {
    let accent_ok = |v: &Voice| accent.map_or(true, |a| v.accent == a);
    let gender_ok = |v: &Voice| gender.map_or(true, |g| v.gender == g);

    tiers
        .primary
        .iter()
        .find(|&v| accent_ok(v) && gender_ok(v))
        .or_else(|| tiers.primary.iter().find(|&v| accent_ok(v)))
        .or_else(|| default_voice(tiers))
}

/// Find the live counterpart of a requested voice
///
/// A stored voice may have disappeared from the engine since it was
/// chosen. In that case the best-ranked voice stands in for it.
pub fn resolve_voice(requested: Option<&Voice>, ranked: &[Voice]) -> Result<Option<Voice>> {
    let Some(requested) = requested else {
        return Ok(ranked.first().cloned());
    };

    let live = ranked
        .iter()
        .find(|v| v.same_profile(requested))
        .or_else(|| {
            // Index-based ids shift between snapshots
            ranked
                .iter()
                .find(|v| !v.id.starts_with("native-") && v.id == requested.id)
        });
    if let Some(voice) = live {
        return Ok(Some(voice.clone()));
    }

    match ranked.first() {
        Some(fallback) => {
            warn!(
                "Voice {} is no longer available, using {}",
                requested, fallback
            );
            Ok(Some(fallback.clone()))
        }
        None => Err(ReadAloudError::VoiceUnavailable(requested.to_string())),
    }
}
