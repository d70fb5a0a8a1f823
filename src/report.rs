use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use crate::models::{BlinkRateCategory, Emotion, FocusState, LogEntry};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateShare {
    pub state: FocusState,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmotionCount {
    pub emotion: Emotion,
    pub count: usize,
}

/// End-of-session aggregates, derivable from the log alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub duration_secs: u64,
    pub entries: usize,
    /// Known only for a live session; the log has no per-blink rows.
    pub total_blinks: Option<usize>,
    pub focus_breakdown: Vec<StateShare>,
    pub blink_states: Vec<(BlinkRateCategory, usize)>,
    pub avg_blinks_per_minute: f64,
    pub top_emotion: Option<Emotion>,
    pub top_emotions: Vec<EmotionCount>,
}

impl SessionSummary {
    pub fn from_entries(
        entries: &[LogEntry],
        duration_secs: u64,
        total_blinks: Option<usize>,
    ) -> Self {
        let total = entries.len();

        let focus_breakdown = FocusState::ALL
            .iter()
            .map(|&state| {
                let count = entries.iter().filter(|e| e.focus_state == state).count();
                StateShare {
                    state,
                    count,
                    percent: percent(count, total),
                }
            })
            .collect();

        let blink_states = BlinkRateCategory::ALL
            .iter()
            .map(|&category| {
                let count = entries.iter().filter(|e| e.blink_rate_category == category).count();
                (category, count)
            })
            .collect();

        let avg_blinks_per_minute = if total == 0 {
            0.0
        } else {
            entries.iter().map(|e| e.blinks_per_minute as f64).sum::<f64>() / total as f64
        };

        let top_emotions = rank_emotions(entries);

        Self {
            duration_secs,
            entries: total,
            total_blinks,
            focus_breakdown,
            blink_states,
            avg_blinks_per_minute,
            top_emotion: top_emotions.first().map(|e| e.emotion.clone()),
            top_emotions: top_emotions.into_iter().take(5).collect(),
        }
    }

    /// Aggregates for a log read back from disk: duration is the largest
    /// `elapsed_seconds`.
    pub fn from_log(entries: &[LogEntry]) -> Self {
        let duration = entries.iter().map(|e| e.elapsed_seconds).max().unwrap_or(0);
        Self::from_entries(entries, duration, None)
    }

    pub fn percent_of(&self, state: FocusState) -> f64 {
        self.focus_breakdown
            .iter()
            .find(|share| share.state == state)
            .map_or(0.0, |share| share.percent)
    }

    /// Whole-number share of focused entries.
    pub fn productivity(&self) -> u32 {
        self.percent_of(FocusState::Focused) as u32
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Emotions by frequency; ties keep first-appearance order.
pub fn rank_emotions(entries: &[LogEntry]) -> Vec<EmotionCount> {
    let mut first_seen: HashMap<&Emotion, usize> = HashMap::new();
    let mut counts: HashMap<&Emotion, usize> = HashMap::new();

    for (idx, entry) in entries.iter().enumerate() {
        first_seen.entry(&entry.emotion).or_insert(idx);
        *counts.entry(&entry.emotion).or_insert(0) += 1;
    }

    let mut ranked: Vec<(&Emotion, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| first_seen[a.0].cmp(&first_seen[b.0])));
    ranked
        .into_iter()
        .map(|(emotion, count)| EmotionCount {
            emotion: emotion.clone(),
            count,
        })
        .collect()
}

pub fn format_duration(secs: u64) -> String {
    format!("{}m {}s", secs / 60, secs % 60)
}

pub fn build_report(label: &str, summary: &SessionSummary, entries: &[LogEntry]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Focus Session Report");
    let _ = writeln!(output, "Generated for {label}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Duration: {}", format_duration(summary.duration_secs));
    let _ = writeln!(output, "- Data points: {}", summary.entries);
    if let Some(total_blinks) = summary.total_blinks {
        let _ = writeln!(output, "- Total blinks detected: {total_blinks}");
    }
    let _ = writeln!(output, "- Productivity: {}%", summary.productivity());
    let _ = writeln!(output, "- Average blink rate: {:.1}/min", summary.avg_blinks_per_minute);
    if let Some(emotion) = &summary.top_emotion {
        let _ = writeln!(output, "- Top emotion: {}", emotion.as_str().to_uppercase());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Focus Breakdown");
    for share in &summary.focus_breakdown {
        let _ = writeln!(
            output,
            "- {}: {} entries ({:.1}%)",
            share.state, share.count, share.percent
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Blink State Analysis");
    for (category, count) in &summary.blink_states {
        let _ = writeln!(output, "- {category}: {count}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Emotions");
    if summary.top_emotions.is_empty() {
        let _ = writeln!(output, "No emotions recorded for this session.");
    } else {
        for emotion in &summary.top_emotions {
            let _ = writeln!(output, "- {}: {}", emotion.emotion, emotion.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Focus Timeline");
    if entries.is_empty() {
        let _ = writeln!(output, "No entries recorded for this session.");
    } else {
        for run in focus_runs(entries) {
            let _ = writeln!(
                output,
                "- {}s to {}s: {}",
                run.start_secs, run.end_secs, run.state
            );
        }
    }

    output
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusRun {
    pub state: FocusState,
    pub start_secs: u64,
    pub end_secs: u64,
}

/// Collapses consecutive entries with the same focus state.
pub fn focus_runs(entries: &[LogEntry]) -> Vec<FocusRun> {
    let mut runs: Vec<FocusRun> = Vec::new();
    for entry in entries {
        match runs.last_mut() {
            Some(run) if run.state == entry.focus_state => run.end_secs = entry.elapsed_seconds,
            _ => runs.push(FocusRun {
                state: entry.focus_state,
                start_secs: entry.elapsed_seconds,
                end_secs: entry.elapsed_seconds,
            }),
        }
    }
    runs
}
