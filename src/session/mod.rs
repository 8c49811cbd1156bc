//! Utterance controller
//!
//! Drives one speech session at a time against the engine and exposes a
//! small state machine: idle, speaking, paused. Engine callbacks come in
//! through [`Controller::handle_event`]; everything the rest of the
//! program needs to hear about goes out as [`SessionEvent`]s.

pub mod progress;

pub use progress::ProgressEstimator;

use crate::engine::{EngineEvent, ErrorCode, SpeechEngine, Utterance, UtteranceId};
use crate::state::Settings;
use crate::voice::{resolve_voice, Voice};
use crate::{ReadAloudError, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::{Duration, Instant};

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("valid word regex"));

/// Words of `text` with their byte offsets, in the order they are spoken
pub fn word_spans(text: &str) -> Vec<(usize, &str)> {
    WORD_RE
        .find_iter(text)
        .map(|m| (m.start(), m.as_str()))
        .collect()
}

/// Words of `text`, as used for highlighting
pub fn words(text: &str) -> Vec<&str> {
    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Speaking,
    Paused,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    /// Stopped on purpose; not an error
    Cancelled,
    Failed(ErrorCode),
}

/// Notifications for whoever presents the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Engine confirmed it began speaking
    Started(UtteranceId),
    Progress { id: UtteranceId, percent: f32 },
    /// Highlight word `index` of the session text
    Word { id: UtteranceId, index: usize, char_index: usize },
    Finished(UtteranceId),
    Cancelled(UtteranceId),
    Failed { id: UtteranceId, error: ErrorCode },
}

/// Counters for the life of the process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub utterances: u64,
    pub characters: u64,
}

impl Statistics {
    fn record(&mut self, text: &str) {
        self.utterances += 1;
        self.characters += text.chars().count() as u64;
    }
}

/// The utterance in flight
#[derive(Debug)]
pub struct Session {
    pub id: UtteranceId,
    pub text: String,
    pub voice: Option<Voice>,
    /// Engine confirmed the start
    pub started: bool,
    /// Index of the next word boundary
    next_word: usize,
    /// Last word reported for highlighting
    pub highlighted: Option<usize>,
    progress: ProgressEstimator,
}

pub struct Controller {
    state: SessionState,
    session: Option<Session>,
    next_id: u64,
    max_chars: usize,
    tick: Duration,
    next_tick: Option<Instant>,
    stats: Statistics,
    last_outcome: Option<(UtteranceId, SessionOutcome)>,
    outbox: Vec<SessionEvent>,
}

impl Controller {
    pub fn new(max_chars: usize, tick: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            session: None,
            next_id: 1,
            max_chars,
            tick,
            next_tick: None,
            stats: Statistics::default(),
            last_outcome: None,
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    /// How the session `id` ended, if it was the last one to end
    pub fn outcome(&self, id: UtteranceId) -> Option<&SessionOutcome> {
        self.last_outcome
            .as_ref()
            .filter(|(last, _)| *last == id)
            .map(|(_, outcome)| outcome)
    }

    /// Current progress estimate; 0 when idle
    pub fn progress(&self, now: Instant) -> f32 {
        self.session
            .as_ref()
            .map_or(0.0, |s| s.progress.percent(now))
    }

    /// Next time `tick` has a progress update to report
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Take the events produced since the last drain
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Check `text` against the limits `speak` enforces, without
    /// touching any engine
    pub fn validate(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            debug!("No text provided");
            return Err(ReadAloudError::NoText);
        }
        let len = text.chars().count();
        if len > self.max_chars {
            return Err(ReadAloudError::TextTooLong {
                len,
                max: self.max_chars,
            });
        }
        Ok(())
    }

    /// Start speaking `text`
    ///
    /// Any session in flight is stopped first. `requested` is resolved
    /// against `ranked`, a fresh ranked snapshot of the engine's voices.
    pub fn speak<E: SpeechEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        text: &str,
        requested: Option<&Voice>,
        ranked: &[Voice],
        settings: &Settings,
        now: Instant,
    ) -> Result<UtteranceId> {
        self.validate(text)?;
        let text = text.trim();
        let len = text.chars().count();

        if self.state != SessionState::Idle {
            self.stop(engine, now);
        }

        let voice = resolve_voice(requested, ranked)?;
        let settings = settings.clamped();
        let id = UtteranceId(self.next_id);
        self.next_id += 1;

        let utterance = Utterance {
            id,
            text: text.to_string(),
            voice: voice.as_ref().map(Voice::to_raw),
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
            lang: voice
                .as_ref()
                .map_or_else(|| settings.language.clone(), |v| v.lang.clone()),
        };

        engine.submit(&utterance)?;
        info!(
            "Speaking {} with {}",
            id,
            voice
                .as_ref()
                .map_or_else(|| "engine default voice".to_string(), |v| v.to_string())
        );

        self.session = Some(Session {
            id,
            text: utterance.text,
            voice,
            started: false,
            next_word: 0,
            highlighted: None,
            progress: ProgressEstimator::new(len, settings.rate),
        });
        self.set_state(SessionState::Speaking);
        Ok(id)
    }

    /// Pause the session; does nothing unless speaking
    pub fn pause<E: SpeechEngine + ?Sized>(&mut self, engine: &mut E, now: Instant) -> Result<()> {
        if self.state != SessionState::Speaking {
            return Ok(());
        }
        engine.pause()?;
        self.enter_paused(now);
        Ok(())
    }

    /// Resume the session; does nothing unless paused
    pub fn resume<E: SpeechEngine + ?Sized>(&mut self, engine: &mut E, now: Instant) -> Result<()> {
        if self.state != SessionState::Paused {
            return Ok(());
        }
        engine.resume()?;
        self.enter_speaking(now);
        Ok(())
    }

    /// Cancel everything and return to idle. Never fails.
    pub fn stop<E: SpeechEngine + ?Sized>(&mut self, engine: &mut E, now: Instant) {
        if let Err(e) = engine.cancel() {
            warn!("Engine failed to cancel: {}", e);
        }
        if let Some(session) = &self.session {
            debug!("Stopping {}", session.id);
            let id = session.id;
            self.finish(id, SessionOutcome::Cancelled, now);
        }
    }

    /// Apply one engine event to the state machine
    pub fn handle_event(&mut self, event: EngineEvent, now: Instant) {
        let id = match &event {
            EngineEvent::Started(id)
            | EngineEvent::Ended(id)
            | EngineEvent::Paused(id)
            | EngineEvent::Resumed(id)
            | EngineEvent::Boundary { id, .. }
            | EngineEvent::Error { id, .. } => *id,
            EngineEvent::VoicesChanged => return,
        };
        let Some(session) = self.session.as_mut() else {
            debug!("Ignoring {:?} with no active session", event);
            return;
        };
        if session.id != id {
            debug!("Ignoring stale {:?}", event);
            return;
        }

        match event {
            EngineEvent::Started(_) => {
                if session.started {
                    return;
                }
                session.started = true;
                self.stats.record(&session.text);
                self.outbox.push(SessionEvent::Started(id));
                if self.state == SessionState::Speaking {
                    session.progress.start(now);
                    self.next_tick = Some(now + self.tick);
                }
            }
            EngineEvent::Paused(_) => {
                if self.state == SessionState::Speaking {
                    self.enter_paused(now);
                }
            }
            EngineEvent::Resumed(_) => {
                if self.state == SessionState::Paused {
                    self.enter_speaking(now);
                }
            }
            EngineEvent::Boundary { char_index, .. } => {
                let index = session.next_word;
                session.next_word += 1;
                session.highlighted = Some(index);
                self.outbox.push(SessionEvent::Word {
                    id,
                    index,
                    char_index,
                });
            }
            EngineEvent::Ended(_) => {
                self.finish(id, SessionOutcome::Completed, now);
            }
            EngineEvent::Error { code, .. } => {
                let outcome = if code.is_benign() {
                    SessionOutcome::Cancelled
                } else {
                    warn!("Speech error on {}: {}", id, code);
                    SessionOutcome::Failed(code)
                };
                self.finish(id, outcome, now);
            }
            EngineEvent::VoicesChanged => {}
        }
    }

    /// Report progress if an update is due
    pub fn tick(&mut self, now: Instant) {
        let Some(due) = self.next_tick else {
            return;
        };
        if due > now || self.state != SessionState::Speaking {
            return;
        }
        if let Some(session) = &self.session {
            self.outbox.push(SessionEvent::Progress {
                id: session.id,
                percent: session.progress.percent(now),
            });
        }
        self.next_tick = Some(now + self.tick);
    }

    fn enter_paused(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            session.progress.pause(now);
        }
        self.next_tick = None;
        self.set_state(SessionState::Paused);
    }

    fn enter_speaking(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            if session.started {
                session.progress.start(now);
                self.next_tick = Some(now + self.tick);
            }
        }
        self.set_state(SessionState::Speaking);
    }

    fn finish(&mut self, id: UtteranceId, outcome: SessionOutcome, now: Instant) {
        self.next_tick = None;
        if let Some(mut session) = self.session.take() {
            if outcome == SessionOutcome::Completed {
                session.progress.complete(now);
                self.outbox.push(SessionEvent::Progress {
                    id,
                    percent: session.progress.percent(now),
                });
            }
        }

        match &outcome {
            SessionOutcome::Completed => {
                info!("Speech {} completed", id);
                self.outbox.push(SessionEvent::Finished(id));
            }
            SessionOutcome::Cancelled => {
                self.outbox.push(SessionEvent::Cancelled(id));
            }
            SessionOutcome::Failed(code) => {
                self.outbox.push(SessionEvent::Failed {
                    id,
                    error: code.clone(),
                });
            }
        }
        self.last_outcome = Some((id, outcome));
        self.set_state(SessionState::Idle);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.outbox.push(SessionEvent::StateChanged(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::EngineCall;
    use crate::engine::{MemoryEngine, RawVoice};

    fn setup() -> (Controller, MemoryEngine, Vec<Voice>) {
        let raw = vec![RawVoice::new("Alex", "en-US")];
        let voices = Voice::from_snapshot(&raw);
        (
            Controller::new(5000, Duration::from_millis(100)),
            MemoryEngine::new(raw),
            voices,
        )
    }

    #[test]
    fn test_words() {
        assert_eq!(words("  hello   big\nworld "), vec!["hello", "big", "world"]);
        assert_eq!(word_spans("a bc"), vec![(0, "a"), (2, "bc")]);
        assert!(words("   ").is_empty());
    }

    #[test]
    fn test_text_too_long() {
        let (mut controller, mut engine, voices) = setup();
        let mut controller_small = Controller::new(5, Duration::from_millis(100));
        let now = Instant::now();

        let err = controller_small
            .speak(&mut engine, "too long", None, &voices, &Settings::default(), now)
            .unwrap_err();
        assert!(matches!(err, ReadAloudError::TextTooLong { len: 8, max: 5 }));
        assert!(engine.calls().is_empty());

        // Surrounding whitespace does not count
        assert!(controller
            .speak(&mut engine, "  fits  ", None, &voices, &Settings::default(), now)
            .is_ok());
    }

    #[test]
    fn test_boundary_indices_reset_per_session() {
        let (mut controller, mut engine, voices) = setup();
        let now = Instant::now();

        let first = controller
            .speak(&mut engine, "one two", None, &voices, &Settings::default(), now)
            .unwrap();
        controller.handle_event(EngineEvent::Boundary { id: first, char_index: 0 }, now);
        controller.handle_event(EngineEvent::Boundary { id: first, char_index: 4 }, now);
        assert_eq!(controller.session().unwrap().highlighted, Some(1));

        let second = controller
            .speak(&mut engine, "three", None, &voices, &Settings::default(), now)
            .unwrap();
        controller.drain_events();
        controller.handle_event(EngineEvent::Boundary { id: second, char_index: 0 }, now);
        assert_eq!(
            controller.drain_events(),
            vec![SessionEvent::Word { id: second, index: 0, char_index: 0 }]
        );
    }

    #[test]
    fn test_engine_error_fails_session() {
        let (mut controller, mut engine, voices) = setup();
        let now = Instant::now();
        let id = controller
            .speak(&mut engine, "hello", None, &voices, &Settings::default(), now)
            .unwrap();
        controller.handle_event(
            EngineEvent::Error { id, code: ErrorCode::SynthesisFailed },
            now,
        );

        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(
            controller.outcome(id),
            Some(&SessionOutcome::Failed(ErrorCode::SynthesisFailed))
        );
        assert!(controller
            .drain_events()
            .contains(&SessionEvent::Failed { id, error: ErrorCode::SynthesisFailed }));
    }

    #[test]
    fn test_pause_unsupported_keeps_speaking() {
        let raw = vec![RawVoice::new("Alex", "en-US")];
        let voices = Voice::from_snapshot(&raw);
        let mut engine = MemoryEngine::new(raw).without_pause();
        let mut controller = Controller::new(5000, Duration::from_millis(100));
        let now = Instant::now();

        controller
            .speak(&mut engine, "hello", None, &voices, &Settings::default(), now)
            .unwrap();
        assert!(controller.pause(&mut engine, now).is_err());
        assert_eq!(controller.state(), SessionState::Speaking);
    }

    #[test]
    fn test_pause_resume_noop_when_idle() {
        let (mut controller, mut engine, _) = setup();
        let now = Instant::now();
        controller.pause(&mut engine, now).unwrap();
        controller.resume(&mut engine, now).unwrap();
        assert!(engine.calls().is_empty());
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn test_settings_clamped_before_submit() {
        let (mut controller, mut engine, voices) = setup();
        let settings = Settings {
            rate: 9.0,
            pitch: -1.0,
            volume: 3.0,
            ..Settings::default()
        };
        controller
            .speak(&mut engine, "hi", None, &voices, &settings, Instant::now())
            .unwrap();
        let submitted = &engine.submitted()[0];
        assert_eq!(submitted.rate, 2.0);
        assert_eq!(submitted.pitch, 0.0);
        assert_eq!(submitted.volume, 1.0);
        assert_eq!(submitted.voice.as_ref().unwrap().name, "Alex");
        assert_eq!(engine.calls(), &[EngineCall::Submit(UtteranceId(1))]);
    }
}
