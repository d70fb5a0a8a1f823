use std::time::Duration;

use anyhow::ensure;
use clap::Args;

/// Tuning knobs for the focus engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Eye aspect ratio below which the eye counts as closed.
    pub blink_aspect_threshold: f64,
    /// Minimum spacing between two registered blinks.
    pub blink_debounce: Duration,
    /// Rolling window used for the blink rate.
    pub blink_window: Duration,
    /// Blinks needed in total before the rate is judged at all.
    pub min_blink_history: usize,
    pub drowsy_below_bpm: usize,
    pub tired_above_bpm: usize,
    pub gaze_min_x: f64,
    pub gaze_max_x: f64,
    /// Spacing between persisted log entries.
    pub sample_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blink_aspect_threshold: 0.3,
            blink_debounce: Duration::from_millis(300),
            blink_window: Duration::from_secs(60),
            min_blink_history: 2,
            drowsy_below_bpm: 8,
            tired_above_bpm: 25,
            gaze_min_x: 0.3,
            gaze_max_x: 0.7,
            sample_interval: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.blink_aspect_threshold.is_finite() && self.blink_aspect_threshold >= 0.0,
            "blink aspect threshold must be a non-negative number"
        );
        ensure!(!self.blink_window.is_zero(), "blink window must be positive");
        ensure!(!self.sample_interval.is_zero(), "sample interval must be positive");
        ensure!(
            self.drowsy_below_bpm <= self.tired_above_bpm,
            "drowsy band ({}) must not exceed tired band ({})",
            self.drowsy_below_bpm,
            self.tired_above_bpm
        );
        ensure!(
            (0.0..=1.0).contains(&self.gaze_min_x)
                && (0.0..=1.0).contains(&self.gaze_max_x)
                && self.gaze_min_x < self.gaze_max_x,
            "gaze band must satisfy 0 <= min < max <= 1"
        );
        Ok(())
    }
}

/// Command-line surface for `EngineConfig`.
#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    #[arg(long, default_value_t = 0.3)]
    pub blink_threshold: f64,
    #[arg(long, default_value_t = 0.3)]
    pub blink_debounce_secs: f64,
    #[arg(long, default_value_t = 60.0)]
    pub blink_window_secs: f64,
    #[arg(long, default_value_t = 2)]
    pub min_blink_history: usize,
    #[arg(long, default_value_t = 8)]
    pub drowsy_below_bpm: usize,
    #[arg(long, default_value_t = 25)]
    pub tired_above_bpm: usize,
    #[arg(long, default_value_t = 0.3)]
    pub gaze_min_x: f64,
    #[arg(long, default_value_t = 0.7)]
    pub gaze_max_x: f64,
    #[arg(long, default_value_t = 2.0)]
    pub sample_interval_secs: f64,
}

impl TryFrom<EngineArgs> for EngineConfig {
    type Error = anyhow::Error;

    fn try_from(args: EngineArgs) -> anyhow::Result<Self> {
        let config = Self {
            blink_aspect_threshold: args.blink_threshold,
            blink_debounce: seconds("blink debounce", args.blink_debounce_secs)?,
            blink_window: seconds("blink window", args.blink_window_secs)?,
            min_blink_history: args.min_blink_history,
            drowsy_below_bpm: args.drowsy_below_bpm,
            tired_above_bpm: args.tired_above_bpm,
            gaze_min_x: args.gaze_min_x,
            gaze_max_x: args.gaze_max_x,
            sample_interval: seconds("sample interval", args.sample_interval_secs)?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn seconds(name: &str, value: f64) -> anyhow::Result<Duration> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "{name} must be a non-negative number of seconds, got {value}"
    );
    Ok(Duration::from_micros((value * 1_000_000.0).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        engine: EngineArgs,
    }

    #[test]
    fn cli_defaults_match_engine_defaults() {
        let harness = Harness::parse_from(["focustrack"]);
        let config = EngineConfig::try_from(harness.engine).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn rejects_inverted_gaze_band() {
        let harness =
            Harness::parse_from(["focustrack", "--gaze-min-x", "0.8", "--gaze-max-x", "0.2"]);
        assert!(EngineConfig::try_from(harness.engine).is_err());
    }

    #[test]
    fn rejects_negative_durations() {
        let harness = Harness::parse_from(["focustrack", "--blink-debounce-secs=-1"]);
        assert!(EngineConfig::try_from(harness.engine).is_err());
    }

    #[test]
    fn rejects_zero_sample_interval() {
        let config = EngineConfig {
            sample_interval: Duration::ZERO,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
