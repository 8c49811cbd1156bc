//! Application state management
//!
//! The State struct is the single owner of everything that changes while
//! the program runs: the engine, the voice list, the speech session and
//! the settings. Nothing else writes to them.

pub mod config;

use crate::engine::{create_engine, EngineEvent, SpeechEngine, UtteranceId};
use crate::session::{Controller, SessionEvent, SessionOutcome, SessionState, Statistics};
use crate::voice::{
    classify, preferred_voice, Accent, Gender, LoadStatus, Provider, Tiers, Voice, VoiceLoader,
};
use crate::{ReadAloudError, Result};
pub use config::Config;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Speech parameters chosen by the user
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// 0.1 - 2.0
    pub rate: f32,
    /// 0.0 - 2.0
    pub pitch: f32,
    /// 0.0 - 1.0
    pub volume: f32,
    /// Target language tag
    pub language: String,
    pub accent: Option<Accent>,
    pub gender: Option<Gender>,
    pub provider: Provider,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            language: "en-US".to_string(),
            accent: None,
            gender: None,
            provider: Provider::Native,
        }
    }
}

impl Settings {
    /// Copy with every parameter inside its valid range
    pub fn clamped(&self) -> Self {
        let clamp = |value: f32, min: f32, max: f32, default: f32| {
            if value.is_nan() {
                default
            } else {
                value.clamp(min, max)
            }
        };
        Self {
            rate: clamp(self.rate, 0.1, 2.0, 1.0),
            pitch: clamp(self.pitch, 0.0, 2.0, 1.0),
            volume: clamp(self.volume, 0.0, 1.0, 1.0),
            ..self.clone()
        }
    }
}

/// Main application state
pub struct State<E: SpeechEngine = Box<dyn SpeechEngine>> {
    /// Configuration loaded from ~/.readaloud.cfg
    pub config: Config,

    settings: Settings,
    engine: E,
    loader: VoiceLoader,
    controller: Controller,

    /// Voice picked by the user, or automatically once voices load
    selected: Option<Voice>,
    /// The user picked `selected` explicitly
    user_selected: bool,
}

impl State {
    /// Load configuration and connect to the configured engine
    ///
    /// Fails only when no speech engine is available at all.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        info!("Configuration loaded from {:?}", config.path());

        let settings = config.settings();
        let engine = create_engine(settings.provider)?;
        info!("Speech engine created: {}", engine.name());

        Ok(Self::with_engine(config, engine, Instant::now()))
    }
}

impl<E: SpeechEngine> State<E> {
    /// Build state around an existing engine and start loading voices
    pub fn with_engine(config: Config, mut engine: E, now: Instant) -> Self {
        let settings = config.settings();
        let mut loader = VoiceLoader::new(config.retry_policy());
        let controller = Controller::new(config.max_chars(), config.progress_tick());

        info!("  Language: {}", settings.language);
        info!("  Rate: {}", settings.rate);
        loader.start(&mut engine, now);

        let mut state = Self {
            config,
            settings,
            engine,
            loader,
            controller,
            selected: None,
            user_selected: false,
        };

        if let Some(query) = state.config.voice() {
            if let Err(e) = state.select_voice(&query) {
                warn!("Configured voice unavailable: {}", e);
            }
        }
        state.auto_select();
        state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Change speech settings; they apply from the next `speak`
    pub fn update_settings(&mut self, settings: Settings) {
        let language_changed = settings.language != self.settings.language;
        self.settings = settings.clamped();
        if language_changed && !self.user_selected {
            self.selected = None;
            self.auto_select();
        }
    }

    pub fn voices(&self) -> &[Voice] {
        self.loader.voices()
    }

    pub fn voice_status(&self) -> LoadStatus {
        self.loader.status()
    }

    /// Ranked view of the current voices for the target language
    pub fn tiers(&self) -> Tiers {
        classify(self.loader.voices(), &self.settings.language)
    }

    pub fn selected_voice(&self) -> Option<&Voice> {
        self.selected.as_ref()
    }

    /// Select a voice by id or by (part of) its name
    pub fn select_voice(&mut self, query: &str) -> Result<&Voice> {
        let needle = query.to_lowercase();
        let voices = self.loader.voices();
        let found = voices
            .iter()
            .find(|v| v.id == query)
            .or_else(|| voices.iter().find(|v| v.name.to_lowercase() == needle))
            .or_else(|| voices.iter().find(|v| v.name.to_lowercase().contains(&needle)))
            .cloned()
            .ok_or_else(|| ReadAloudError::VoiceUnavailable(query.to_string()))?;

        info!("Selected voice {}", found);
        self.user_selected = true;
        Ok(self.selected.insert(found))
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    pub fn statistics(&self) -> Statistics {
        self.controller.statistics()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Progress estimate for the active session
    pub fn progress(&self, now: Instant) -> f32 {
        self.controller.progress(now)
    }

    /// Start speaking, replacing anything in flight
    pub fn speak(&mut self, text: &str, now: Instant) -> Result<UtteranceId> {
        // Validate before touching the engine at all
        self.controller.validate(text)?;

        self.loader.refresh(&mut self.engine);
        self.auto_select();
        let candidates = self.candidates();

        self.controller.speak(
            &mut self.engine,
            text,
            self.selected.as_ref(),
            &candidates,
            &self.settings,
            now,
        )
    }

    /// Ranked voices for the target language, led by the selected voice
    /// when it is still offered but ranks outside that language
    fn candidates(&self) -> Vec<Voice> {
        let mut ranked = self.tiers().ranked();
        if let Some(chosen) = &self.selected {
            if !ranked.iter().any(|v| v.same_profile(chosen)) {
                let live = self.loader.voices().iter().find(|v| v.same_profile(chosen));
                if let Some(live) = live {
                    ranked.insert(0, live.clone());
                }
            }
        }
        ranked
    }

    pub fn pause(&mut self, now: Instant) -> Result<()> {
        self.controller.pause(&mut self.engine, now)
    }

    pub fn resume(&mut self, now: Instant) -> Result<()> {
        self.controller.resume(&mut self.engine, now)
    }

    /// Pause when speaking, resume when paused
    pub fn toggle_pause(&mut self, now: Instant) -> Result<()> {
        match self.controller.state() {
            SessionState::Speaking => self.pause(now),
            SessionState::Paused => self.resume(now),
            SessionState::Idle => Ok(()),
        }
    }

    pub fn stop(&mut self, now: Instant) {
        self.controller.stop(&mut self.engine, now);
    }

    /// First keyboard or pointer input from the user
    pub fn user_gesture(&mut self, now: Instant) {
        self.loader.on_user_gesture(&mut self.engine, now);
    }

    /// Re-run voice loading from scratch
    pub fn reload_voices(&mut self, now: Instant) {
        self.loader.start(&mut self.engine, now);
        self.auto_select();
    }

    /// Advance loader, engine events and timers
    pub fn pump(&mut self, now: Instant) -> Vec<SessionEvent> {
        self.loader.poll(&mut self.engine, now);

        for event in self.engine.poll_events() {
            match event {
                EngineEvent::VoicesChanged => self.loader.on_voices_changed(now),
                other => self.controller.handle_event(other, now),
            }
        }

        self.controller.tick(now);
        self.auto_select();
        self.controller.drain_events()
    }

    /// Earliest moment `pump` has timed work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.loader.next_deadline(), self.controller.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Block until session `id` ends or `timeout` passes
    ///
    /// Session events observed while waiting are passed to `on_event`.
    pub fn wait(
        &mut self,
        id: UtteranceId,
        timeout: Duration,
        mut on_event: impl FnMut(&SessionEvent),
    ) -> Result<SessionOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            for event in self.pump(now) {
                on_event(&event);
            }

            match self.controller.outcome(id) {
                Some(SessionOutcome::Failed(code)) => {
                    return Err(ReadAloudError::Session(code.clone()))
                }
                Some(outcome) => return Ok(outcome.clone()),
                None => {}
            }

            if now >= deadline {
                warn!("Timed out waiting for {}", id);
                self.stop(now);
                for event in self.controller.drain_events() {
                    on_event(&event);
                }
                return Ok(SessionOutcome::Cancelled);
            }

            let sleep = self
                .next_deadline()
                .map(|at| at.saturating_duration_since(now))
                .unwrap_or(Duration::from_millis(20))
                .clamp(Duration::from_millis(5), Duration::from_millis(50));
            std::thread::sleep(sleep);
        }
    }

    /// Render text to an audio file
    ///
    /// No engine can capture its output yet.
    pub fn export_audio(&self, _text: &str) -> Result<Vec<u8>> {
        Err(ReadAloudError::Unsupported(format!(
            "audio export is not available for the {} engine",
            self.engine.name()
        )))
    }

    /// Persist the current voice choice
    pub fn save_voice_choice(&mut self) -> Result<()> {
        if let Some(voice) = &self.selected {
            let name = voice.name.clone();
            self.config.set("speech", "voice", &name);
            self.config.save()?;
        }
        Ok(())
    }

    fn auto_select(&mut self) {
        if self.selected.is_some() {
            return;
        }
        let tiers = self.tiers();
        if let Some(voice) = preferred_voice(&tiers, self.settings.accent, self.settings.gender) {
            debug!("Auto-selected voice {}", voice);
            self.selected = Some(voice.clone());
        }
    }
}

impl<E: SpeechEngine> Drop for State<E> {
    fn drop(&mut self) {
        if self.controller.state() != SessionState::Idle {
            self.controller.stop(&mut self.engine, Instant::now());
        }
    }
}
