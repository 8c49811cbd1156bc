//! Speech progress estimation
//!
//! Engines do not say how far through an utterance they are, so progress
//! is estimated from text length and rate and only counts time spent
//! actually speaking.

use std::time::{Duration, Instant};

/// Highest estimate reported before the engine confirms completion
pub const ESTIMATE_CEILING: f32 = 95.0;

/// Characters spoken per second at normal rate
const CHARS_PER_SECOND: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    estimate: Duration,
    accumulated: Duration,
    running_since: Option<Instant>,
    completed: bool,
}

impl ProgressEstimator {
    pub fn new(char_count: usize, rate: f32) -> Self {
        Self {
            estimate: estimate_duration(char_count, rate),
            accumulated: Duration::ZERO,
            running_since: None,
            completed: false,
        }
    }

    /// Expected speaking time
    pub fn estimate(&self) -> Duration {
        self.estimate
    }

    /// Start or resume the clock
    pub fn start(&mut self, now: Instant) {
        if self.running_since.is_none() && !self.completed {
            self.running_since = Some(now);
        }
    }

    /// Freeze the clock
    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    /// Engine confirmed the end of the utterance
    pub fn complete(&mut self, now: Instant) {
        self.pause(now);
        self.completed = true;
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Percentage spoken, 0 - 100
    pub fn percent(&self, now: Instant) -> f32 {
        if self.completed {
            return 100.0;
        }
        let elapsed = self.accumulated
            + self
                .running_since
                .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));
        if self.estimate.is_zero() {
            return ESTIMATE_CEILING;
        }
        let fraction = elapsed.as_secs_f32() / self.estimate.as_secs_f32();
        (fraction * 100.0).min(ESTIMATE_CEILING)
    }
}

/// Rough time needed to speak `char_count` characters at `rate`
pub fn estimate_duration(char_count: usize, rate: f32) -> Duration {
    let slowdown = (2.0 - rate).max(0.1);
    Duration::from_secs_f32(char_count as f32 / CHARS_PER_SECOND * slowdown)
}
