use std::time::Duration;

use crate::config::EngineConfig;
use crate::models::BlinkRateCategory;

/// A registered blink, stamped with the session's monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlinkEvent {
    pub at: Duration,
}

/// Every blink of a session, oldest first. Never pruned: the rolling
/// window is applied when reading.
#[derive(Debug, Clone, Default)]
pub struct BlinkHistory {
    events: Vec<BlinkEvent>,
}

impl BlinkHistory {
    /// Appends a blink. Timestamps earlier than the newest event are clamped
    /// so the history stays ordered.
    pub fn record(&mut self, at: Duration) {
        let at = self.events.last().map_or(at, |last| at.max(last.at));
        self.events.push(BlinkEvent { at });
    }

    pub fn total(&self) -> usize {
        self.events.len()
    }

    /// Number of blinks with `now - at < window`.
    pub fn count_within(&self, now: Duration, window: Duration) -> usize {
        let expired = self
            .events
            .partition_point(|event| now.checked_sub(event.at).is_some_and(|age| age >= window));
        self.events.len() - expired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkRate {
    pub blinks_per_minute: usize,
    pub category: BlinkRateCategory,
}

#[derive(Debug, Clone)]
pub struct BlinkRateAnalyzer {
    window: Duration,
    min_history: usize,
    drowsy_below: usize,
    tired_above: usize,
}

impl BlinkRateAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window: config.blink_window,
            min_history: config.min_blink_history,
            drowsy_below: config.drowsy_below_bpm,
            tired_above: config.tired_above_bpm,
        }
    }

    /// Blinks inside the rolling window, scaled to one minute.
    pub fn blinks_per_minute(&self, history: &BlinkHistory, now: Duration) -> usize {
        let count = history.count_within(now, self.window);
        if self.window == Duration::from_secs(60) {
            return count;
        }
        (count as f64 * 60.0 / self.window.as_secs_f64()).round() as usize
    }

    pub fn analyze(&self, history: &BlinkHistory, now: Duration) -> BlinkRate {
        let blinks_per_minute = self.blinks_per_minute(history, now);
        let category = if history.total() < self.min_history {
            BlinkRateCategory::Normal
        } else if blinks_per_minute < self.drowsy_below {
            BlinkRateCategory::Drowsy
        } else if blinks_per_minute > self.tired_above {
            BlinkRateCategory::Tired
        } else {
            BlinkRateCategory::Normal
        };

        BlinkRate {
            blinks_per_minute,
            category,
        }
    }
}
