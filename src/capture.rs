use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::FrameObservation;
use crate::session::{FocusEngine, SessionError};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read frame input: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: invalid frame: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: frame time {t} is not a valid offset")]
    InvalidTime { line: usize, t: f64 },
}

/// Upper bound on frame offsets (about 31 years).
const MAX_FRAME_TIME_SECS: f64 = 1e9;

pub fn parse_frame(line: usize, raw: &str) -> Result<FrameObservation, CaptureError> {
    let frame: FrameObservation =
        serde_json::from_str(raw).map_err(|source| CaptureError::Parse { line, source })?;
    if let Some(t) = frame.t {
        if !(0.0..=MAX_FRAME_TIME_SECS).contains(&t) {
            return Err(CaptureError::InvalidTime { line, t });
        }
    }
    Ok(frame)
}

/// Reads JSON Lines frames on a background task and hands them over through
/// a bounded queue. Malformed lines are logged and skipped. The task returns
/// the number of frames delivered.
pub fn spawn_reader<R>(
    reader: R,
    capacity: usize,
) -> (mpsc::Receiver<FrameObservation>, JoinHandle<Result<usize, CaptureError>>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut lines = reader.lines();
        let mut line_no = 0usize;
        let mut delivered = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            match parse_frame(line_no, &line) {
                Ok(frame) => {
                    if tx.send(frame).await.is_err() {
                        debug!(line = line_no, "frame consumer closed");
                        break;
                    }
                    delivered += 1;
                }
                Err(err) => warn!(error = %err, "skipping frame"),
            }
        }

        Ok(delivered)
    });

    (rx, handle)
}

/// Feeds queued frames to the engine until the queue drains or `shutdown`
/// resolves. Returns the session clock at the point of stopping.
pub async fn drive<F>(
    engine: &mut FocusEngine,
    frames: &mut mpsc::Receiver<FrameObservation>,
    shutdown: F,
) -> Result<Duration, SessionError>
where
    F: Future<Output = ()>,
{
    let started = Instant::now();
    let mut clock = Duration::ZERO;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                debug!("stop signal received");
                break;
            }
            next = frames.recv() => {
                let Some(frame) = next else { break };
                let at = frame.t.map_or_else(|| started.elapsed(), Duration::from_secs_f64);
                clock = clock.max(at);
                let outcome = engine.process(&frame, at)?;
                debug!(
                    at_secs = at.as_secs_f64(),
                    focus_state = %outcome.focus_state,
                    rule = outcome.rule.name,
                    eyes = outcome.signals.eye_count,
                    blinks = outcome.blinks_registered,
                    blinks_per_minute = outcome.blinks_per_minute,
                    logged = outcome.logged,
                    "frame processed"
                );
            }
        }
    }

    Ok(clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::FocusState;
    use chrono::NaiveDate;
    use std::future::pending;

    fn engine() -> FocusEngine {
        let start = NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        FocusEngine::new(EngineConfig::default(), start)
    }

    fn frame_line(t: f64) -> String {
        format!(
            concat!(
                r#"{{"t":{t},"width":640,"height":480,"faces":[{{"x":220,"y":140,"w":200,"#,
                r#""h":200,"emotion":"neutral","confidence":80.0,"eyes":[{{"x":40,"y":60,"#,
                r#""w":40,"h":30}},{{"x":120,"y":60,"w":40,"h":30}}]}}]}}"#
            ),
            t = t
        )
    }

    #[test]
    fn negative_frame_time_is_rejected() {
        let err = parse_frame(3, r#"{"t":-1.0,"width":10,"height":10}"#).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidTime { line: 3, .. }));
    }

    #[tokio::test]
    async fn replays_frames_until_input_ends() {
        let input: String = (0..125)
            .map(|i| frame_line(f64::from(i) / 30.0) + "\n")
            .collect();
        let (mut rx, reader) = spawn_reader(std::io::Cursor::new(input.into_bytes()), 8);

        let mut engine = engine();
        let clock = drive(&mut engine, &mut rx, pending()).await.unwrap();

        assert_eq!(reader.await.unwrap().unwrap(), 125);
        assert!((clock.as_secs_f64() - 124.0 / 30.0).abs() < 1e-6);
        let entries = engine.session().entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.focus_state == FocusState::Focused));
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let input = format!("{}\nnot json\n\n{}\n", frame_line(0.0), frame_line(2.5));
        let (mut rx, reader) = spawn_reader(std::io::Cursor::new(input.into_bytes()), 2);

        let mut engine = engine();
        drive(&mut engine, &mut rx, pending()).await.unwrap();

        assert_eq!(reader.await.unwrap().unwrap(), 2);
        assert_eq!(engine.session().entries().len(), 1);
    }

    #[tokio::test]
    async fn stop_signal_ends_the_loop() {
        let (_tx, mut rx) = mpsc::channel::<FrameObservation>(1);
        let mut engine = engine();
        let clock = drive(&mut engine, &mut rx, async {}).await.unwrap();
        assert_eq!(clock, Duration::ZERO);
        assert!(engine.session().entries().is_empty());
    }
}
