//! Per-language keyword tables for voice ranking

use super::subtags;

/// Name fragments that mark a higher-quality voice
pub const QUALITY_KEYWORDS: &[&str] = &["google", "chrome", "natural", "enhanced", "premium", "neural"];

/// How to recognize voices for one target language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    /// Primary language subtag, e.g. "en"
    pub code: String,
    /// Full tags accepted as-is, lowercase
    pub tag_variants: Vec<String>,
    /// Voice-name fragments that identify the language
    pub name_keywords: Vec<String>,
    /// Primary subtags of related or commonly available languages
    pub fallback_langs: Vec<String>,
    /// Voice-name fragments that make any voice a fallback candidate
    pub fallback_name_keywords: Vec<String>,
    /// (language subtag, name fragment) pairs that both have to match
    pub fallback_pairs: Vec<(String, String)>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl LanguageProfile {
    /// Profile for a target language tag
    pub fn for_tag(tag: &str) -> Self {
        let code = subtags(tag).into_iter().next().unwrap_or_default();
        match code.as_str() {
            "en" => Self::english(),
            "si" => Self::sinhala(),
            _ => Self::generic(&code),
        }
    }

    pub fn english() -> Self {
        Self {
            code: "en".to_string(),
            tag_variants: strings(&["en", "en-us", "en-gb", "en-au", "en-ca", "en-in"]),
            name_keywords: strings(&["english"]),
            fallback_langs: strings(&["es", "fr", "de", "it"]),
            fallback_name_keywords: strings(&["microsoft", "apple"]),
            fallback_pairs: Vec::new(),
        }
    }

    pub fn sinhala() -> Self {
        Self {
            code: "si".to_string(),
            tag_variants: strings(&["si", "si-lk", "si_lk"]),
            name_keywords: strings(&["sinhala"]),
            fallback_langs: strings(&["ta", "hi", "bn"]),
            fallback_name_keywords: Vec::new(),
            fallback_pairs: vec![
                ("en".to_string(), "india".to_string()),
                ("en".to_string(), "en-in".to_string()),
            ],
        }
    }

    /// Languages without a curated table match on their subtag alone
    pub fn generic(code: &str) -> Self {
        Self {
            code: code.to_string(),
            tag_variants: vec![code.to_string()],
            name_keywords: Vec::new(),
            fallback_langs: Vec::new(),
            fallback_name_keywords: Vec::new(),
            fallback_pairs: Vec::new(),
        }
    }

    /// Language tag belongs to the target language
    pub fn matches_lang(&self, lang: &str) -> bool {
        let lang = lang.to_ascii_lowercase();
        if self.tag_variants.iter().any(|t| *t == lang) {
            return true;
        }
        subtags(&lang).first().map(|s| *s == self.code).unwrap_or(false)
    }

    /// Voice belongs to the primary tier
    pub fn matches_voice(&self, name: &str, lang: &str) -> bool {
        if self.matches_lang(lang) {
            return true;
        }
        let name = name.to_lowercase();
        self.name_keywords.iter().any(|k| name.contains(k.as_str()))
    }

    /// Voice is an acceptable stand-in when nothing in the target language exists
    pub fn matches_fallback(&self, name: &str, lang: &str) -> bool {
        let name = name.to_lowercase();
        let lang_lower = lang.to_ascii_lowercase();
        let primary = subtags(lang).into_iter().next().unwrap_or_default();

        if self.fallback_langs.iter().any(|l| *l == primary) {
            return true;
        }
        if self
            .fallback_name_keywords
            .iter()
            .any(|k| name.contains(k.as_str()))
        {
            return true;
        }
        self.fallback_pairs.iter().any(|(l, fragment)| {
            *l == primary && (name.contains(fragment.as_str()) || lang_lower == *fragment)
        })
    }
}

/// Name carries one of the quality keywords
pub fn has_quality_keyword(name: &str) -> bool {
    let name = name.to_lowercase();
    QUALITY_KEYWORDS.iter().any(|k| name.contains(k))
}
