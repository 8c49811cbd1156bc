//! Voice catalog loading
//!
//! Engines populate their voice list whenever they feel like it: some
//! have it ready immediately, some announce it later, some only after
//! something has been spoken. The loader keeps re-reading the engine on
//! one schedule until it sees voices, and tells subscribers whenever the
//! list changes.

use super::Voice;
use crate::engine::SpeechEngine;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// When and how often to re-read the engine's voice list
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first re-read after the immediate attempt
    pub interval: Duration,
    /// Polling gives up after this many reads
    pub max_attempts: u32,
    /// Consecutive non-empty reads that end polling early
    pub settle_hits: u32,
    /// Multiplier applied to the delay after every attempt
    pub backoff: f32,
    /// One last read at this point if nothing was ever found
    pub final_attempt: Duration,
    /// Delay between a change notification and the re-read
    pub change_debounce: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            max_attempts: 20,
            settle_hits: 3,
            backoff: 1.0,
            final_attempt: Duration::from_secs(5),
            change_debounce: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff.max(1.0).powi(attempt.saturating_sub(1) as i32);
        self.interval.mul_f32(factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Still trying
    Pending,
    /// Voices observed
    Loaded(usize),
    /// Every attempt came back empty; the engine has no voices to offer
    Exhausted,
}

type Subscriber = Box<dyn FnMut(&[Voice])>;

/// Take a snapshot of the engine's voices
///
/// Engine failures count as an empty list.
pub fn load_voices<E: SpeechEngine + ?Sized>(engine: &mut E) -> Vec<Voice> {
    match engine.voices() {
        Ok(raw) => Voice::from_snapshot(&raw),
        Err(e) => {
            warn!("Failed to read voices from {} engine: {}", engine.name(), e);
            Vec::new()
        }
    }
}

/// Owner of the current voice list
pub struct VoiceLoader {
    policy: RetryPolicy,
    voices: Vec<Voice>,
    subscribers: Vec<Subscriber>,

    attempts: u32,
    consecutive_hits: u32,
    next_poll: Option<Instant>,
    final_attempt_at: Option<Instant>,
    pending_read: Option<Instant>,
    gesture_handled: bool,
}

impl VoiceLoader {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            voices: Vec::new(),
            subscribers: Vec::new(),
            attempts: 0,
            consecutive_hits: 0,
            next_poll: None,
            final_attempt_at: None,
            pending_read: None,
            gesture_handled: false,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Most recent non-empty snapshot
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Call `callback` with every new voice list
    pub fn subscribe(&mut self, callback: impl FnMut(&[Voice]) + 'static) {
        self.subscribers.push(Box::new(callback));
    }

    /// Begin (or restart) the polling schedule with an immediate read
    pub fn start<E: SpeechEngine + ?Sized>(&mut self, engine: &mut E, now: Instant) {
        info!("Starting voice loading on {} engine", engine.name());
        self.attempts = 0;
        self.consecutive_hits = 0;
        self.final_attempt_at = Some(now + self.policy.final_attempt);
        self.poll_attempt(engine, now);
    }

    /// Run whatever reads are due
    pub fn poll<E: SpeechEngine + ?Sized>(&mut self, engine: &mut E, now: Instant) {
        if self.pending_read.map_or(false, |at| at <= now) {
            self.pending_read = None;
            self.read(engine);
        }

        if self.next_poll.map_or(false, |at| at <= now) {
            self.poll_attempt(engine, now);
        }

        if self.final_attempt_at.map_or(false, |at| at <= now) {
            self.final_attempt_at = None;
            if self.voices.is_empty() {
                info!("Final voice loading attempt");
                if !self.read(engine) {
                    warn!("No voices available from {} engine", engine.name());
                }
            }
        }
    }

    /// Engine announced that its voice list changed
    pub fn on_voices_changed(&mut self, now: Instant) {
        debug!("Voices changed event");
        self.schedule_read(now + self.policy.change_debounce);
    }

    /// First user input: some engines need it before they load voices
    pub fn on_user_gesture<E: SpeechEngine + ?Sized>(&mut self, engine: &mut E, now: Instant) {
        if self.gesture_handled {
            return;
        }
        self.gesture_handled = true;
        debug!("Priming engine after first user input");
        if let Err(e) = engine.prime() {
            warn!("Failed to prime {} engine: {}", engine.name(), e);
        }
        self.schedule_read(now + self.policy.change_debounce);
    }

    /// Read the engine right now, returning the current list
    pub fn refresh<E: SpeechEngine + ?Sized>(&mut self, engine: &mut E) -> &[Voice] {
        self.read(engine);
        &self.voices
    }

    /// Earliest moment `poll` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let final_attempt = if self.voices.is_empty() {
            self.final_attempt_at
        } else {
            None
        };
        [self.next_poll, self.pending_read, final_attempt]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn is_polling(&self) -> bool {
        self.next_poll.is_some()
    }

    pub fn status(&self) -> LoadStatus {
        if !self.voices.is_empty() {
            LoadStatus::Loaded(self.voices.len())
        } else if self.next_poll.is_none()
            && self.final_attempt_at.is_none()
            && self.pending_read.is_none()
        {
            LoadStatus::Exhausted
        } else {
            LoadStatus::Pending
        }
    }

    fn schedule_read(&mut self, at: Instant) {
        self.pending_read = Some(self.pending_read.map_or(at, |existing| existing.min(at)));
    }

    fn poll_attempt<E: SpeechEngine + ?Sized>(&mut self, engine: &mut E, now: Instant) {
        self.attempts += 1;

        if self.read(engine) {
            self.consecutive_hits += 1;
        } else {
            self.consecutive_hits = 0;
        }

        if self.consecutive_hits >= self.policy.settle_hits.max(1) {
            debug!("Voice list settled after {} attempts", self.attempts);
            self.next_poll = None;
        } else if self.attempts >= self.policy.max_attempts {
            debug!("Polling completed, voices may not be available");
            self.next_poll = None;
        } else {
            self.next_poll = Some(now + self.policy.delay_after(self.attempts));
        }
    }

    /// Returns whether the engine reported any voices
    fn read<E: SpeechEngine + ?Sized>(&mut self, engine: &mut E) -> bool {
        let snapshot = load_voices(engine);
        if snapshot.is_empty() {
            debug!("No voices available yet, will retry");
            return false;
        }

        if snapshot != self.voices {
            info!("Loaded {} voices", snapshot.len());
            self.voices = snapshot;
            for subscriber in &mut self.subscribers {
                subscriber(&self.voices);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryEngine, RawVoice};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn alex() -> Vec<RawVoice> {
        vec![RawVoice::new("Alex", "en-US")]
    }

    #[test]
    fn test_backoff() {
        let policy = RetryPolicy {
            backoff: 2.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(800));
        assert_eq!(RetryPolicy::default().delay_after(5), Duration::from_millis(200));
    }

    #[test]
    fn test_immediate_read() {
        let mut engine = MemoryEngine::new(alex());
        let mut loader = VoiceLoader::new(RetryPolicy::default());
        loader.start(&mut engine, Instant::now());
        assert_eq!(loader.status(), LoadStatus::Loaded(1));
        assert_eq!(engine.voice_reads(), 1);
    }

    #[test]
    fn test_polling_settles() {
        let mut engine = MemoryEngine::new(alex());
        let mut loader = VoiceLoader::new(RetryPolicy::default());
        let t0 = Instant::now();
        loader.start(&mut engine, t0);

        for step in 1..10 {
            loader.poll(&mut engine, t0 + Duration::from_millis(200 * step));
        }
        // Three consecutive hits end polling
        assert_eq!(engine.voice_reads(), 3);
        assert!(!loader.is_polling());
    }

    #[test]
    fn test_exhausted_without_voices() {
        let mut engine = MemoryEngine::new(Vec::new());
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let mut loader = VoiceLoader::new(policy);
        let t0 = Instant::now();
        loader.start(&mut engine, t0);
        loader.poll(&mut engine, t0 + Duration::from_millis(200));
        loader.poll(&mut engine, t0 + Duration::from_millis(400));
        assert_eq!(engine.voice_reads(), 3);
        assert_eq!(loader.status(), LoadStatus::Pending);

        loader.poll(&mut engine, t0 + Duration::from_secs(5));
        assert_eq!(engine.voice_reads(), 4);
        assert_eq!(loader.status(), LoadStatus::Exhausted);
        assert_eq!(loader.next_deadline(), None);
    }

    #[test]
    fn test_change_notification_after_polling() {
        let mut engine = MemoryEngine::new(alex());
        let mut loader = VoiceLoader::new(RetryPolicy::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        loader.subscribe(move |voices| sink.borrow_mut().push(voices.len()));

        let t0 = Instant::now();
        loader.start(&mut engine, t0);

        engine.announce_voices(vec![
            RawVoice::new("Alex", "en-US"),
            RawVoice::new("Fiona", "en-GB"),
        ]);
        loader.on_voices_changed(t0);
        loader.poll(&mut engine, t0 + Duration::from_millis(50));
        assert_eq!(*seen.borrow(), vec![1]);

        loader.poll(&mut engine, t0 + Duration::from_millis(100));
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_user_gesture_is_one_shot() {
        let mut engine = MemoryEngine::new(Vec::new());
        let mut loader = VoiceLoader::new(RetryPolicy::default());
        let t0 = Instant::now();
        loader.on_user_gesture(&mut engine, t0);
        loader.on_user_gesture(&mut engine, t0);
        let primes = engine
            .calls()
            .iter()
            .filter(|c| **c == crate::engine::memory::EngineCall::Prime)
            .count();
        assert_eq!(primes, 1);
        assert_eq!(loader.next_deadline(), Some(t0 + Duration::from_millis(100)));
    }
}
