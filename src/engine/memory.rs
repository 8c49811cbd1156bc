//! In-process speech engine
//!
//! Produces no audio. It reports scripted voice snapshots, records every
//! call made to it, and plays utterances back as a sequence of lifecycle
//! events. Used by the test suite and by `--dry-run`.

use super::{EngineEvent, ErrorCode, RawVoice, SpeechEngine, Utterance, UtteranceId};
use crate::session::word_spans;
use crate::{ReadAloudError, Result};
use log::debug;
use std::collections::VecDeque;

/// A call received by [`MemoryEngine`], in order of arrival
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Voices,
    Submit(UtteranceId),
    Pause,
    Resume,
    Cancel,
    Prime,
}

pub struct MemoryEngine {
    /// Snapshots handed out by successive `voices()` calls
    snapshots: VecDeque<Vec<RawVoice>>,
    /// Snapshot repeated once `snapshots` runs out
    current: Vec<RawVoice>,
    calls: Vec<EngineCall>,
    /// Events delivered on the next poll
    pending: VecDeque<EngineEvent>,
    /// Auto-play events, released one per poll
    script: VecDeque<EngineEvent>,
    auto_play: bool,
    pause_supported: bool,
    active: Option<UtteranceId>,
    paused: bool,
    submitted: Vec<Utterance>,
}

impl MemoryEngine {
    /// Engine that always reports `voices`
    pub fn new(voices: Vec<RawVoice>) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: voices,
            calls: Vec::new(),
            pending: VecDeque::new(),
            script: VecDeque::new(),
            auto_play: false,
            pause_supported: true,
            active: None,
            paused: false,
            submitted: Vec::new(),
        }
    }

    /// Engine whose voice list starts empty and then reports each
    /// snapshot in turn, repeating the last one
    pub fn with_snapshots(snapshots: Vec<Vec<RawVoice>>) -> Self {
        let mut engine = Self::new(Vec::new());
        engine.snapshots = snapshots.into();
        engine
    }

    /// A small voice set resembling what desktop browsers report
    pub fn sample_voices() -> Vec<RawVoice> {
        let mut voices = vec![
            RawVoice::new("Google US English", "en-US"),
            RawVoice::new("Microsoft David", "en-US"),
            RawVoice::new("Microsoft Hazel", "en-GB"),
            RawVoice::new("Karen", "en-AU"),
            RawVoice::new("Microsoft Hortense", "fr-FR"),
            RawVoice::new("Google Deutsch", "de-DE"),
        ];
        voices[0].local_service = false;
        voices[1].default = true;
        voices
    }

    /// Play every submitted utterance through to completion
    pub fn auto_play(mut self, enabled: bool) -> Self {
        self.auto_play = enabled;
        self
    }

    /// Make `pause`/`resume` fail the way engines without them do
    pub fn without_pause(mut self) -> Self {
        self.pause_supported = false;
        self
    }

    /// Queue an event for the next poll
    pub fn emit(&mut self, event: EngineEvent) {
        self.pending.push_back(event);
    }

    /// Replace the voice list and announce the change
    pub fn announce_voices(&mut self, voices: Vec<RawVoice>) {
        self.snapshots.clear();
        self.current = voices;
        self.pending.push_back(EngineEvent::VoicesChanged);
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    /// Number of `voices()` calls received so far
    pub fn voice_reads(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == EngineCall::Voices)
            .count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn submitted(&self) -> &[Utterance] {
        &self.submitted
    }

    pub fn active(&self) -> Option<UtteranceId> {
        self.active
    }

    fn script_for(utterance: &Utterance) -> VecDeque<EngineEvent> {
        let id = utterance.id;
        let mut script = VecDeque::new();
        script.push_back(EngineEvent::Started(id));
        for (start, _) in word_spans(&utterance.text) {
            // Boundaries count characters, spans count bytes
            let char_index = utterance.text[..start].chars().count();
            script.push_back(EngineEvent::Boundary { id, char_index });
        }
        script.push_back(EngineEvent::Ended(id));
        script
    }

    fn settle(&mut self, event: &EngineEvent) {
        let finished = match event {
            EngineEvent::Ended(id) | EngineEvent::Error { id, .. } => Some(*id),
            _ => None,
        };
        if finished.is_some() && finished == self.active {
            self.active = None;
            self.paused = false;
        }
    }
}

impl SpeechEngine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    fn voices(&mut self) -> Result<Vec<RawVoice>> {
        self.calls.push(EngineCall::Voices);
        if let Some(next) = self.snapshots.pop_front() {
            self.current = next;
        }
        Ok(self.current.clone())
    }

    fn submit(&mut self, utterance: &Utterance) -> Result<()> {
        debug!("Memory engine speaking {}: {}", utterance.id, utterance.text);
        self.calls.push(EngineCall::Submit(utterance.id));
        self.active = Some(utterance.id);
        self.paused = false;
        if self.auto_play {
            self.script = Self::script_for(utterance);
        }
        self.submitted.push(utterance.clone());
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if !self.pause_supported {
            return Err(ReadAloudError::Unsupported(
                "pause is not supported by this engine".to_string(),
            ));
        }
        self.calls.push(EngineCall::Pause);
        if let Some(id) = self.active {
            if !self.paused {
                self.paused = true;
                self.pending.push_back(EngineEvent::Paused(id));
            }
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if !self.pause_supported {
            return Err(ReadAloudError::Unsupported(
                "resume is not supported by this engine".to_string(),
            ));
        }
        self.calls.push(EngineCall::Resume);
        if let Some(id) = self.active {
            if self.paused {
                self.paused = false;
                self.pending.push_back(EngineEvent::Resumed(id));
            }
        }
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.calls.push(EngineCall::Cancel);
        self.script.clear();
        self.paused = false;
        if let Some(id) = self.active.take() {
            self.pending.push_back(EngineEvent::Error {
                id,
                code: ErrorCode::Interrupted,
            });
        }
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.active.is_some()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        let mut events: Vec<EngineEvent> = self.pending.drain(..).collect();
        if self.auto_play && !self.paused {
            if let Some(event) = self.script.pop_front() {
                events.push(event);
            }
        }
        for event in &events {
            self.settle(event);
        }
        events
    }

    fn prime(&mut self) -> Result<()> {
        self.calls.push(EngineCall::Prime);
        Ok(())
    }
}
