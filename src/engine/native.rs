//! Native TTS engine using the tts crate
//!
//! This engine uses the `tts` crate which provides a unified interface to:
//! - Speech Dispatcher on Linux (via native bindings)
//! - AVFoundation on macOS/iOS (via native bindings)
//! - WinRT / SAPI on Windows
//!
//! Utterance callbacks arrive on whatever thread the platform uses, so they
//! are funneled through a channel and handed out by `poll_events`.

use super::{EngineEvent, ErrorCode, RawVoice, SpeechEngine, Utterance, UtteranceId};
use crate::{ReadAloudError, Result};
use log::{debug, error, warn};
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use tts::Tts;

/// Platform utterances still expected to report back
const MAX_ROUTES: usize = 64;

/// Callbacks held while their utterance has not been bound yet
const MAX_UNMATCHED: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Callback {
    Begin,
    End,
    Stop,
}

impl Callback {
    fn event(self, id: UtteranceId) -> EngineEvent {
        match self {
            Callback::Begin => EngineEvent::Started(id),
            Callback::End => EngineEvent::Ended(id),
            Callback::Stop => EngineEvent::Error {
                id,
                code: ErrorCode::Interrupted,
            },
        }
    }

    fn is_final(self) -> bool {
        self != Callback::Begin
    }
}

/// Attributes platform callbacks to our utterances
///
/// Keyed by the platform's own utterance id, so a late stop for an
/// utterance that was replaced still names the replaced utterance.
/// A route bound to `None` swallows its callbacks.
struct CallbackRouter<K> {
    routes: VecDeque<(K, Option<UtteranceId>)>,
    unmatched: VecDeque<(K, Callback)>,
}

impl<K: PartialEq> CallbackRouter<K> {
    fn new() -> Self {
        Self {
            routes: VecDeque::new(),
            unmatched: VecDeque::new(),
        }
    }

    /// Record which of our utterances `key` speaks, releasing any
    /// callbacks that arrived before the platform returned the key
    fn bind(&mut self, key: K, id: Option<UtteranceId>) -> Vec<EngineEvent> {
        let mut released = Vec::new();
        let mut finished = false;
        self.unmatched.retain(|(k, kind)| {
            if *k != key {
                return true;
            }
            if let Some(id) = id {
                released.push(kind.event(id));
            }
            finished |= kind.is_final();
            false
        });

        if !finished {
            if self.routes.len() >= MAX_ROUTES {
                self.routes.pop_front();
            }
            self.routes.push_back((key, id));
        }
        released
    }

    fn route(&mut self, key: K, kind: Callback) -> Option<EngineEvent> {
        match self.routes.iter().position(|(k, _)| *k == key) {
            Some(pos) => {
                let target = self.routes[pos].1;
                if kind.is_final() {
                    self.routes.remove(pos);
                }
                target.map(|id| kind.event(id))
            }
            None => {
                if self.unmatched.len() >= MAX_UNMATCHED {
                    self.unmatched.pop_front();
                }
                self.unmatched.push_back((key, kind));
                None
            }
        }
    }
}

type SharedRouter = Arc<Mutex<CallbackRouter<tts::UtteranceId>>>;

/// Utterance tracked through `is_speaking` when callbacks are unavailable
#[derive(Debug, Clone, Copy)]
struct Watch {
    id: UtteranceId,
    seen_speaking: bool,
}

impl Watch {
    fn new(id: UtteranceId) -> Self {
        Self {
            id,
            seen_speaking: false,
        }
    }

    /// Feed one `is_speaking` reading (`None` when the platform cannot
    /// tell); true once the utterance has been heard and gone quiet
    fn observe(&mut self, speaking: Option<bool>) -> bool {
        match speaking {
            Some(true) => {
                self.seen_speaking = true;
                false
            }
            Some(false) => self.seen_speaking,
            None => false,
        }
    }
}

/// Native TTS engine using the tts crate
pub struct NativeEngine {
    tts: Tts,

    /// Voices from the last snapshot, used to resolve `Utterance::voice`
    voices: Vec<tts::Voice>,

    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,

    router: SharedRouter,

    /// Utterance being tracked by polling when callbacks cannot name it
    watching: Option<Watch>,
}

impl NativeEngine {
    /// Create a new native TTS engine
    ///
    /// Initializes the platform-appropriate TTS backend
    pub fn new() -> Result<Self> {
        debug!("Creating native TTS engine");

        let tts = Tts::default()
            .map_err(|e| ReadAloudError::Engine(format!("Failed to initialize TTS: {}", e)))?;

        let (events_tx, events_rx) = channel();

        let engine = Self {
            tts,
            voices: Vec::new(),
            events_tx,
            events_rx,
            router: Arc::new(Mutex::new(CallbackRouter::new())),
            watching: None,
        };
        engine.register_callbacks()?;

        debug!("Native TTS engine created successfully");
        Ok(engine)
    }

    fn register_callbacks(&self) -> Result<()> {
        if !self.tts.supported_features().utterance_callbacks {
            warn!("Utterance callbacks not supported, progress is tracked by polling");
            return Ok(());
        }

        self.tts
            .on_utterance_begin(Some(self.forward(Callback::Begin)))
            .map_err(|e| ReadAloudError::Engine(format!("Failed to register callback: {}", e)))?;
        self.tts
            .on_utterance_end(Some(self.forward(Callback::End)))
            .map_err(|e| ReadAloudError::Engine(format!("Failed to register callback: {}", e)))?;
        self.tts
            .on_utterance_stop(Some(self.forward(Callback::Stop)))
            .map_err(|e| ReadAloudError::Engine(format!("Failed to register callback: {}", e)))?;

        Ok(())
    }

    /// Callback that routes `kind` for whichever utterance it names
    fn forward(&self, kind: Callback) -> Box<dyn FnMut(tts::UtteranceId)> {
        let tx = self.events_tx.clone();
        let router = Arc::clone(&self.router);
        Box::new(move |key| {
            let event = match router.lock() {
                Ok(mut router) => router.route(key, kind),
                Err(_) => None,
            };
            if let Some(event) = event {
                let _ = tx.send(event);
            }
        })
    }

    fn bind(&self, key: tts::UtteranceId, id: Option<UtteranceId>) {
        let released = match self.router.lock() {
            Ok(mut router) => router.bind(key, id),
            Err(_) => Vec::new(),
        };
        for event in released {
            let _ = self.events_tx.send(event);
        }
    }

    fn apply_parameters(&mut self, utterance: &Utterance) -> Result<()> {
        let features = self.tts.supported_features();

        if features.rate {
            let rate = map_range(
                utterance.rate,
                (0.1, 1.0, 2.0),
                (self.tts.min_rate(), self.tts.normal_rate(), self.tts.max_rate()),
            );
            self.tts
                .set_rate(rate)
                .map_err(|e| ReadAloudError::Engine(format!("Failed to set rate: {}", e)))?;
        } else {
            debug!("Rate control not supported on this platform");
        }

        if features.pitch {
            let pitch = map_range(
                utterance.pitch,
                (0.0, 1.0, 2.0),
                (self.tts.min_pitch(), self.tts.normal_pitch(), self.tts.max_pitch()),
            );
            self.tts
                .set_pitch(pitch)
                .map_err(|e| ReadAloudError::Engine(format!("Failed to set pitch: {}", e)))?;
        }

        if features.volume {
            let min = self.tts.min_volume();
            let max = self.tts.max_volume();
            let volume = min + (max - min) * utterance.volume.clamp(0.0, 1.0);
            self.tts
                .set_volume(volume)
                .map_err(|e| ReadAloudError::Engine(format!("Failed to set volume: {}", e)))?;
        }

        if let Some(requested) = &utterance.voice {
            if !features.voice {
                warn!("Voice selection not supported on this platform");
            } else if let Some(voice) = self
                .voices
                .iter()
                .find(|v| v.id() == requested.id || v.name() == requested.name)
            {
                debug!("Selecting voice: {}", voice.name());
                self.tts
                    .set_voice(voice)
                    .map_err(|e| ReadAloudError::Engine(format!("Failed to set voice: {}", e)))?;
            } else {
                warn!("Voice {} not found in engine snapshot", requested.name);
            }
        }

        Ok(())
    }
}

/// Map a value from our scale onto a platform scale
///
/// Both scales are split at their normal point so that 1.0 always lands
/// on the platform's normal value.
fn map_range(value: f32, ours: (f32, f32, f32), theirs: (f32, f32, f32)) -> f32 {
    let (lo, mid, hi) = ours;
    let (min, normal, max) = theirs;
    let v = value.clamp(lo, hi);
    if v <= mid {
        min + (normal - min) * (v - lo) / (mid - lo)
    } else {
        normal + (max - normal) * (v - mid) / (hi - mid)
    }
}

impl SpeechEngine for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    fn voices(&mut self) -> Result<Vec<RawVoice>> {
        let features = self.tts.supported_features();
        if !features.voice {
            debug!("Voice listing not supported on this platform");
            return Ok(Vec::new());
        }

        let voices = self
            .tts
            .voices()
            .map_err(|e| ReadAloudError::Engine(format!("Failed to get voices: {}", e)))?;

        let default_id = if features.get_voice {
            self.tts.voice().ok().flatten().map(|v| v.id())
        } else {
            None
        };

        let raw = voices
            .iter()
            .map(|voice| RawVoice {
                id: voice.id(),
                name: voice.name(),
                lang: voice.language().to_string(),
                local_service: true,
                default: default_id.as_deref() == Some(voice.id().as_str()),
            })
            .collect();

        self.voices = voices;
        Ok(raw)
    }

    fn submit(&mut self, utterance: &Utterance) -> Result<()> {
        self.apply_parameters(utterance)?;
        self.watching = None;

        debug!("Speaking {}: {}", utterance.id, utterance.text);
        let key = self.tts.speak(utterance.text.as_str(), true).map_err(|e| {
            error!("Failed to speak: {}", e);
            ReadAloudError::Engine(format!("Speak failed: {}", e))
        })?;

        match key {
            Some(key) if self.tts.supported_features().utterance_callbacks => {
                self.bind(key, Some(utterance.id));
            }
            _ => {
                debug!("Tracking {} by polling", utterance.id);
                let _ = self.events_tx.send(EngineEvent::Started(utterance.id));
                self.watching = Some(Watch::new(utterance.id));
            }
        }

        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        Err(ReadAloudError::Unsupported(
            "pause is not supported by the native engine".to_string(),
        ))
    }

    fn resume(&mut self) -> Result<()> {
        Err(ReadAloudError::Unsupported(
            "resume is not supported by the native engine".to_string(),
        ))
    }

    fn cancel(&mut self) -> Result<()> {
        debug!("Canceling speech");
        self.watching = None;
        self.tts.stop().map_err(|e| {
            error!("Failed to cancel speech: {}", e);
            ReadAloudError::Engine(format!("Cancel failed: {}", e))
        })?;
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        if self.tts.supported_features().is_speaking {
            self.tts.is_speaking().unwrap_or(false)
        } else {
            self.watching.is_some()
        }
    }

    fn is_paused(&self) -> bool {
        false
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        let mut events: Vec<EngineEvent> = self.events_rx.try_iter().collect();

        // Without is_speaking the end is never observed; the caller's
        // timeout settles the session instead
        let speaking = if self.tts.supported_features().is_speaking {
            self.tts.is_speaking().ok()
        } else {
            None
        };
        if let Some(watch) = self.watching.as_mut() {
            if watch.observe(speaking) {
                events.push(EngineEvent::Ended(watch.id));
                self.watching = None;
            }
        }

        events
    }

    fn prime(&mut self) -> Result<()> {
        let features = self.tts.supported_features();
        if !features.volume {
            return Ok(());
        }

        debug!("Priming native engine");
        let min = self.tts.min_volume();
        self.tts
            .set_volume(min)
            .map_err(|e| ReadAloudError::Engine(format!("Failed to set volume: {}", e)))?;
        let key = self
            .tts
            .speak(" ", true)
            .map_err(|e| ReadAloudError::Engine(format!("Speak failed: {}", e)))?;
        if let Some(key) = key {
            self.bind(key, None);
        }
        self.tts
            .stop()
            .map_err(|e| ReadAloudError::Engine(format!("Cancel failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_engine() {
        // May fail if the system doesn't have speech-dispatcher (Linux)
        // or if running in CI without audio
        match NativeEngine::new() {
            Ok(_) => println!("✓ Native TTS engine initialized successfully"),
            Err(e) => println!("⚠ TTS initialization failed (may be expected in CI): {}", e),
        }
    }

    #[test]
    fn test_late_stop_names_replaced_utterance() {
        let mut router = CallbackRouter::new();
        let (a, b) = (UtteranceId(1), UtteranceId(2));

        assert!(router.bind(10u64, Some(a)).is_empty());
        assert_eq!(router.route(10, Callback::Begin), Some(EngineEvent::Started(a)));

        // Restart: B is bound before the platform reports A stopped
        assert!(router.bind(11, Some(b)).is_empty());
        assert_eq!(
            router.route(10, Callback::Stop),
            Some(EngineEvent::Error { id: a, code: ErrorCode::Interrupted })
        );
        assert_eq!(router.route(11, Callback::Begin), Some(EngineEvent::Started(b)));
        assert_eq!(router.route(11, Callback::End), Some(EngineEvent::Ended(b)));

        // Finished routes are forgotten
        assert_eq!(router.route(11, Callback::End), None);
    }

    #[test]
    fn test_early_callbacks_released_on_bind() {
        let mut router = CallbackRouter::new();
        let id = UtteranceId(3);

        assert_eq!(router.route(20u64, Callback::Begin), None);
        assert_eq!(router.bind(20, Some(id)), vec![EngineEvent::Started(id)]);
        assert_eq!(router.route(20, Callback::End), Some(EngineEvent::Ended(id)));

        // An utterance that finished before binding leaves no route behind
        router.route(21, Callback::Begin);
        router.route(21, Callback::End);
        assert_eq!(
            router.bind(21, Some(UtteranceId(4))),
            vec![EngineEvent::Started(UtteranceId(4)), EngineEvent::Ended(UtteranceId(4))]
        );
        assert!(router.routes.is_empty());
    }

    #[test]
    fn test_unowned_utterance_is_silent() {
        let mut router = CallbackRouter::new();
        router.bind(30u64, None);
        assert_eq!(router.route(30, Callback::Begin), None);
        assert_eq!(router.route(30, Callback::Stop), None);
    }

    #[test]
    fn test_unmatched_callbacks_bounded() {
        let mut router = CallbackRouter::new();
        for key in 0..(MAX_UNMATCHED as u64 * 2) {
            router.route(key, Callback::Stop);
        }
        assert_eq!(router.unmatched.len(), MAX_UNMATCHED);
    }

    #[test]
    fn test_watch_waits_for_speech() {
        let mut watch = Watch::new(UtteranceId(1));
        // Not started yet
        assert!(!watch.observe(Some(false)));
        assert!(!watch.observe(Some(true)));
        assert!(!watch.observe(Some(true)));
        assert!(watch.observe(Some(false)));
    }

    #[test]
    fn test_watch_without_speaking_state_never_ends() {
        let mut watch = Watch::new(UtteranceId(1));
        for _ in 0..10 {
            assert!(!watch.observe(None));
        }
    }

    #[test]
    fn test_map_range_normal_points() {
        assert_eq!(map_range(1.0, (0.1, 1.0, 2.0), (0.5, 1.0, 10.0)), 1.0);
        assert_eq!(map_range(0.1, (0.1, 1.0, 2.0), (0.5, 1.0, 10.0)), 0.5);
        assert_eq!(map_range(2.0, (0.1, 1.0, 2.0), (0.5, 1.0, 10.0)), 10.0);
    }

    #[test]
    fn test_map_range_clamps() {
        assert_eq!(map_range(5.0, (0.0, 1.0, 2.0), (0.0, 1.0, 2.0)), 2.0);
        assert_eq!(map_range(-1.0, (0.0, 1.0, 2.0), (0.0, 1.0, 2.0)), 0.0);
        assert_eq!(map_range(1.5, (0.0, 1.0, 2.0), (0.0, 50.0, 100.0)), 75.0);
    }
}
