//! Configuration management

use super::Settings;
use crate::voice::RetryPolicy;
use crate::{ReadAloudError, Result};
use ini::Ini;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default maximum utterance length, in characters
pub const DEFAULT_MAX_CHARS: usize = 5000;

/// Persistent settings
///
/// Speech parameters, voice loading policy, and the one piece of state
/// the program writes on its own: whether the shortcut tooltip has been
/// shown.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path (~/.readaloud.cfg)
    path: PathBuf,
}

impl Config {
    /// Load configuration from disk or create default
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific file, creating it if missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| ReadAloudError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(&path)
                .map_err(|e| ReadAloudError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self { ini, path })
    }

    /// Configuration that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            ini: Self::default_config(),
            path: PathBuf::new(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        debug!("Saving config to {:?}", self.path);
        self.ini
            .write_to_file(&self.path)
            .map_err(|e| ReadAloudError::Config(format!("Failed to save config: {}", e)))
    }

    /// Get config file path (~/.readaloud.cfg)
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".readaloud.cfg")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Create default configuration
    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("speech"))
            .set("rate", "1.0")
            .set("pitch", "1.0")
            .set("volume", "1.0")
            .set("language", "en-US")
            .set("provider", "native")
            .set("voice", "")
            .set("accent", "")
            .set("gender", "")
            .set("max_chars", DEFAULT_MAX_CHARS.to_string());

        ini.with_section(Some("loader"))
            .set("interval_ms", "200")
            .set("max_attempts", "20")
            .set("settle_hits", "3")
            .set("backoff", "1.0")
            .set("final_attempt_ms", "5000")
            .set("change_debounce_ms", "100");

        ini.with_section(Some("session")).set("tick_ms", "100");

        ini.with_section(Some("ui")).set("onboarding_shown", "false");

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get an integer value from config
    pub fn get_int(&self, section: &str, key: &str, default: u64) -> u64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    /// Optional value: missing and empty are the same
    fn get_optional<T: std::str::FromStr>(&self, section: &str, key: &str) -> Option<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.ini.get_from(Some(section), key)?.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring [{}] {}: {}", section, key, e);
                None
            }
        }
    }

    /// Speech settings, clamped to their valid ranges
    pub fn settings(&self) -> Settings {
        let defaults = Settings::default();
        Settings {
            rate: self.get_float("speech", "rate", defaults.rate),
            pitch: self.get_float("speech", "pitch", defaults.pitch),
            volume: self.get_float("speech", "volume", defaults.volume),
            language: self.get_string("speech", "language", &defaults.language),
            accent: self.get_optional("speech", "accent"),
            gender: self.get_optional("speech", "gender"),
            provider: self
                .get_optional("speech", "provider")
                .unwrap_or(defaults.provider),
        }
        .clamped()
    }

    /// Name or id of the voice chosen last time
    pub fn voice(&self) -> Option<String> {
        self.get_optional("speech", "voice")
    }

    /// Longest text accepted by `speak`
    pub fn max_chars(&self) -> usize {
        self.get_int("speech", "max_chars", DEFAULT_MAX_CHARS as u64) as usize
    }

    /// Voice loading schedule
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let millis = |key: &str, default: Duration| {
            Duration::from_millis(self.get_int("loader", key, default.as_millis() as u64))
        };

        RetryPolicy {
            interval: millis("interval_ms", defaults.interval),
            max_attempts: self.get_int("loader", "max_attempts", defaults.max_attempts as u64)
                as u32,
            settle_hits: self.get_int("loader", "settle_hits", defaults.settle_hits as u64) as u32,
            backoff: self.get_float("loader", "backoff", defaults.backoff),
            final_attempt: millis("final_attempt_ms", defaults.final_attempt),
            change_debounce: millis("change_debounce_ms", defaults.change_debounce),
        }
    }

    /// Interval between progress updates
    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.get_int("session", "tick_ms", 100).max(10))
    }

    /// Has the shortcut tooltip already been shown?
    pub fn onboarding_shown(&self) -> bool {
        self.get_bool("ui", "onboarding_shown", false)
    }

    /// Remember that the shortcut tooltip was dismissed
    pub fn mark_onboarding_shown(&mut self) -> Result<()> {
        self.set("ui", "onboarding_shown", "true");
        self.save()
    }
}
