use std::time::Duration;

use tracing::debug;

use crate::blink::BlinkHistory;
use crate::models::{BoundingBox, EyeObservation};

/// Height over width of an eye box; 0 for a zero-width box.
pub fn aspect_ratio(height: u32, width: u32) -> f64 {
    if width == 0 {
        return 0.0;
    }
    f64::from(height) / f64::from(width)
}

/// Normalizes an eye box (relative to its face box) against the frame size.
pub fn observe_eye(
    face: &BoundingBox,
    eye: &BoundingBox,
    frame_width: u32,
    frame_height: u32,
) -> EyeObservation {
    let center_x = face.x.saturating_add(eye.x).saturating_add(eye.w / 2);
    let center_y = face.y.saturating_add(eye.y).saturating_add(eye.h / 2);

    EyeObservation {
        center_x: normalize(center_x, frame_width),
        center_y: normalize(center_y, frame_height),
        aspect_ratio: aspect_ratio(eye.h, eye.w),
    }
}

fn normalize(value: u32, extent: u32) -> f64 {
    if extent == 0 {
        return 0.0;
    }
    f64::from(value) / f64::from(extent)
}

/// Turns per-frame eye aspect ratios into debounced blink events.
///
/// The debounce marker starts at session start, so nothing registers during
/// the first debounce interval.
#[derive(Debug, Clone)]
pub struct EyeAspectTracker {
    threshold: f64,
    debounce: Duration,
    last_blink: Duration,
}

impl EyeAspectTracker {
    pub fn new(threshold: f64, debounce: Duration) -> Self {
        Self {
            threshold,
            debounce,
            last_blink: Duration::ZERO,
        }
    }

    /// Records a blink at `at` when the eye looks closed and the debounce
    /// interval has passed. Returns whether a blink was registered.
    pub fn observe(&mut self, aspect_ratio: f64, at: Duration, history: &mut BlinkHistory) -> bool {
        if aspect_ratio >= self.threshold {
            return false;
        }

        if at.saturating_sub(self.last_blink) < self.debounce {
            return false;
        }

        history.record(at);
        self.last_blink = at;
        debug!(at_secs = at.as_secs_f64(), aspect_ratio, "blink registered");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tracker() -> EyeAspectTracker {
        EyeAspectTracker::new(0.3, Duration::from_millis(300))
    }

    #[test]
    fn zero_width_box_has_zero_ratio() {
        assert_eq!(aspect_ratio(20, 0), 0.0);
        assert_eq!(aspect_ratio(10, 40), 0.25);
    }

    #[test]
    fn eye_centre_is_normalized_to_frame() {
        let face = BoundingBox { x: 100, y: 50, w: 200, h: 200 };
        let eye = BoundingBox { x: 40, y: 60, w: 41, h: 20 };
        let observed = observe_eye(&face, &eye, 640, 480);
        assert!((observed.center_x - 160.0 / 640.0).abs() < 1e-12);
        assert!((observed.center_y - 120.0 / 480.0).abs() < 1e-12);
        assert!((observed.aspect_ratio - 20.0 / 41.0).abs() < 1e-12);
    }

    #[test]
    fn empty_frame_size_does_not_divide_by_zero() {
        let observed = observe_eye(&BoundingBox::default(), &BoundingBox::default(), 0, 0);
        assert_eq!(observed.center_x, 0.0);
        assert_eq!(observed.center_y, 0.0);
        assert_eq!(observed.aspect_ratio, 0.0);
    }

    #[test]
    fn no_blink_during_first_debounce_interval() {
        let mut history = BlinkHistory::default();
        let mut tracker = tracker();
        assert!(!tracker.observe(0.1, Duration::from_millis(50), &mut history));
        assert!(!tracker.observe(0.1, Duration::from_millis(299), &mut history));
        assert!(tracker.observe(0.1, Duration::from_millis(300), &mut history));
        assert_eq!(history.total(), 1);
    }

    #[test]
    fn blink_exactly_at_debounce_boundary_registers() {
        let mut history = BlinkHistory::default();
        let mut tracker = tracker();
        assert!(tracker.observe(0.1, Duration::from_millis(1000), &mut history));
        assert!(tracker.observe(0.1, Duration::from_millis(1300), &mut history));
        assert_eq!(history.total(), 2);
    }

    proptest! {
        #[test]
        fn open_eyes_never_blink(ratio in 0.3f64..10.0, at_ms in 0u64..600_000) {
            let mut history = BlinkHistory::default();
            let registered = tracker().observe(ratio, Duration::from_millis(at_ms), &mut history);
            prop_assert!(!registered);
            prop_assert_eq!(history.total(), 0);
        }

        #[test]
        fn close_candidates_register_once(start_ms in 300u64..600_000, gap_ms in 0u64..300) {
            let mut history = BlinkHistory::default();
            let mut tracker = tracker();
            prop_assert!(tracker.observe(0.1, Duration::from_millis(start_ms), &mut history));
            let repeat = Duration::from_millis(start_ms + gap_ms);
            prop_assert!(!tracker.observe(0.1, repeat, &mut history));
            prop_assert_eq!(history.total(), 1);
        }
    }
}
