use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDateTime, SubsecRound, TimeDelta};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blink::{BlinkHistory, BlinkRate, BlinkRateAnalyzer};
use crate::config::EngineConfig;
use crate::export::{self, ExportError};
use crate::eyes::{observe_eye, EyeAspectTracker};
use crate::focus::{FocusClassifier, FocusRule};
use crate::models::{
    BlinkRateCategory, Emotion, FocusState, FrameObservation, FrameSignals, LogEntry,
};
use crate::report::SessionSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopped,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} is already stopped")]
    Stopped(Uuid),
}

/// Export failed after the session was stopped. The summary is kept.
#[derive(Debug, Error)]
#[error("failed to export session {session_id}")]
pub struct FinalizeError {
    pub session_id: Uuid,
    pub summary: Box<SessionSummary>,
    #[source]
    pub source: ExportError,
}

/// Owns the log and the blink history of one observation run.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    started_at: NaiveDateTime,
    state: SessionState,
    entries: Vec<LogEntry>,
    blinks: BlinkHistory,
    last_logged: Duration,
    stopped_after: Option<Duration>,
}

impl Session {
    pub fn new(started_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: started_at.trunc_subsecs(0),
            state: SessionState::Running,
            entries: Vec::new(),
            blinks: BlinkHistory::default(),
            last_logged: Duration::ZERO,
            stopped_after: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> NaiveDateTime {
        self.started_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn blinks(&self) -> &BlinkHistory {
        &self.blinks
    }

    fn wall_clock(&self, elapsed: Duration) -> NaiveDateTime {
        TimeDelta::from_std(elapsed)
            .ok()
            .and_then(|offset| self.started_at.checked_add_signed(offset))
            .unwrap_or(self.started_at)
            .trunc_subsecs(0)
    }

    fn summary(&self, duration: Duration) -> SessionSummary {
        SessionSummary::from_entries(
            &self.entries,
            duration.as_secs(),
            Some(self.blinks.total()),
        )
    }
}

/// What the engine concluded about one frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub signals: FrameSignals,
    pub focus_state: FocusState,
    pub rule: &'static FocusRule,
    pub blinks_per_minute: usize,
    pub blinks_registered: usize,
    pub logged: bool,
}

#[derive(Debug, Clone)]
pub struct FinalizedSession {
    pub summary: SessionSummary,
    /// `None` when nothing was logged.
    pub path: Option<PathBuf>,
}

/// Per-frame pipeline: eye tracker, blink rate, classifier, recorder.
#[derive(Debug, Clone)]
pub struct FocusEngine {
    config: EngineConfig,
    tracker: EyeAspectTracker,
    analyzer: BlinkRateAnalyzer,
    classifier: FocusClassifier,
    session: Session,
}

impl FocusEngine {
    pub fn new(config: EngineConfig, started_at: NaiveDateTime) -> Self {
        let session = Session::new(started_at);
        info!(session_id = %session.id, started_at = %session.started_at, "session started");
        Self {
            tracker: EyeAspectTracker::new(config.blink_aspect_threshold, config.blink_debounce),
            analyzer: BlinkRateAnalyzer::new(&config),
            classifier: FocusClassifier::new(&config),
            config,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs one frame through the pipeline. `at` is time since session start.
    pub fn process(
        &mut self,
        frame: &FrameObservation,
        at: Duration,
    ) -> Result<FrameOutcome, SessionError> {
        if self.session.state() == SessionState::Stopped {
            return Err(SessionError::Stopped(self.session.id));
        }

        let mut emotion = Emotion::None;
        let mut confidence = 0.0;
        let mut eye_count = 0;
        let mut eye_positions = Vec::new();
        let mut blinks_registered = 0;

        for face in &frame.faces {
            (emotion, confidence) = face.emotion_prediction();
            eye_count = face.eyes.len();

            for eye in &face.eyes {
                let observed = observe_eye(&face.bounds, eye, frame.width, frame.height);
                eye_positions.push((observed.center_x, observed.center_y));
                if self.tracker.observe(observed.aspect_ratio, at, &mut self.session.blinks) {
                    blinks_registered += 1;
                }
            }
        }

        let BlinkRate {
            blinks_per_minute,
            category,
        } = self.analyzer.analyze(&self.session.blinks, at);
        // Without a face the rate is still reported, but the category stays normal.
        let category = if frame.faces.is_empty() {
            BlinkRateCategory::Normal
        } else {
            category
        };

        let signals = FrameSignals {
            emotion,
            emotion_confidence: confidence,
            eyes_detected: eye_count > 0,
            eye_count,
            eye_positions,
            blink_rate_category: category,
        };
        let rule = self.classifier.decide(&signals);
        let logged = self.record(&signals, rule.state, blinks_per_minute, at);

        Ok(FrameOutcome {
            focus_state: rule.state,
            rule,
            blinks_per_minute,
            blinks_registered,
            logged,
            signals,
        })
    }

    fn record(
        &mut self,
        signals: &FrameSignals,
        focus_state: FocusState,
        blinks_per_minute: usize,
        at: Duration,
    ) -> bool {
        if at.saturating_sub(self.session.last_logged) < self.config.sample_interval {
            return false;
        }

        let focus_state = if signals.eyes_detected {
            focus_state
        } else {
            FocusState::Distracted
        };

        let entry = LogEntry {
            timestamp: self.session.wall_clock(at),
            elapsed_seconds: at.as_secs(),
            eyes_detected: signals.eyes_detected,
            eye_count: signals.eye_count,
            emotion: signals.emotion.clone(),
            confidence: signals.emotion_confidence,
            blink_rate_category: signals.blink_rate_category,
            blinks_per_minute,
            focus_state,
        };
        debug!(
            elapsed_seconds = entry.elapsed_seconds,
            focus_state = %entry.focus_state,
            emotion = %entry.emotion,
            "log entry appended"
        );
        self.session.entries.push(entry);
        self.session.last_logged = at;
        true
    }

    /// Stops the session and computes its aggregates. Repeated calls return
    /// the aggregates of the first stop.
    pub fn stop(&mut self, at: Duration) -> SessionSummary {
        let duration = match self.session.stopped_after {
            Some(duration) => duration,
            None => {
                self.session.state = SessionState::Stopped;
                self.session.stopped_after = Some(at);
                info!(
                    session_id = %self.session.id,
                    entries = self.session.entries.len(),
                    total_blinks = self.session.blinks().total(),
                    "session stopped"
                );
                at
            }
        };
        self.session.summary(duration)
    }

    /// Stops the session and writes its log into `out_dir`.
    pub fn finalize(
        &mut self,
        at: Duration,
        out_dir: &Path,
    ) -> Result<FinalizedSession, FinalizeError> {
        let summary = self.stop(at);

        if self.session.entries.is_empty() {
            warn!(session_id = %self.session.id, "no data logged, skipping export");
            return Ok(FinalizedSession { summary, path: None });
        }

        match export::write_session(&self.session, out_dir) {
            Ok(path) => {
                info!(
                    session_id = %self.session.id,
                    path = %path.display(),
                    "session log exported"
                );
                Ok(FinalizedSession {
                    summary,
                    path: Some(path),
                })
            }
            Err(source) => Err(FinalizeError {
                session_id: self.session.id,
                summary: Box::new(summary),
                source,
            }),
        }
    }
}
