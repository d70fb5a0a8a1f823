use std::fmt;

use crate::config::EngineConfig;
use crate::models::{BlinkRateCategory, Emotion, FocusState, FrameSignals};

/// Horizontal band of the frame that counts as looking at the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeBand {
    pub min_x: f64,
    pub max_x: f64,
}

impl From<&EngineConfig> for GazeBand {
    fn from(config: &EngineConfig) -> Self {
        Self {
            min_x: config.gaze_min_x,
            max_x: config.gaze_max_x,
        }
    }
}

impl Default for GazeBand {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// One entry of the ordered decision list.
pub struct FocusRule {
    pub name: &'static str,
    pub state: FocusState,
    applies: fn(&FrameSignals, &GazeBand) -> bool,
}

impl fmt::Debug for FocusRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FocusRule")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}

impl FocusRule {
    pub fn applies(&self, signals: &FrameSignals, gaze: &GazeBand) -> bool {
        (self.applies)(signals, gaze)
    }
}

/// Evaluated top to bottom; the first matching rule decides. The eye and
/// blink overrides must stay ahead of the emotion rules.
pub static FOCUS_RULES: [FocusRule; 8] = [
    FocusRule {
        name: "no-eyes",
        state: FocusState::Distracted,
        applies: |s, _| !s.eyes_detected || s.eye_count == 0,
    },
    FocusRule {
        name: "single-eye",
        state: FocusState::Distracted,
        applies: |s, _| s.eye_count == 1,
    },
    FocusRule {
        name: "drowsy-blink-rate",
        state: FocusState::Drowsy,
        applies: |s, _| s.blink_rate_category == BlinkRateCategory::Drowsy,
    },
    FocusRule {
        name: "gaze-off-centre",
        state: FocusState::Distracted,
        applies: |s, gaze| {
            mean_gaze_x(&s.eye_positions).is_some_and(|x| x < gaze.min_x || x > gaze.max_x)
        },
    },
    FocusRule {
        name: "happy",
        state: FocusState::Distracted,
        applies: |s, _| s.emotion == Emotion::Happy,
    },
    FocusRule {
        name: "neutral-or-angry",
        state: FocusState::Focused,
        applies: |s, _| matches!(s.emotion, Emotion::Neutral | Emotion::Angry),
    },
    FocusRule {
        name: "sad",
        state: FocusState::Drowsy,
        applies: |s, _| s.emotion == Emotion::Sad,
    },
    FocusRule {
        name: "fallback",
        state: FocusState::Neutral,
        applies: |_, _| true,
    },
];

pub fn mean_gaze_x(positions: &[(f64, f64)]) -> Option<f64> {
    if positions.is_empty() {
        return None;
    }
    Some(positions.iter().map(|(x, _)| x).sum::<f64>() / positions.len() as f64)
}

#[derive(Debug, Clone, Default)]
pub struct FocusClassifier {
    gaze: GazeBand,
}

impl FocusClassifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            gaze: GazeBand::from(config),
        }
    }

    /// The rule that decides the focus state for these signals.
    pub fn decide(&self, signals: &FrameSignals) -> &'static FocusRule {
        let fallback = &FOCUS_RULES[FOCUS_RULES.len() - 1];
        FOCUS_RULES
            .iter()
            .find(|rule| rule.applies(signals, &self.gaze))
            .unwrap_or(fallback)
    }

    pub fn classify(&self, signals: &FrameSignals) -> FocusState {
        self.decide(signals).state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signals(
        emotion: Emotion,
        eye_count: usize,
        blink: BlinkRateCategory,
        xs: &[f64],
    ) -> FrameSignals {
        FrameSignals {
            emotion,
            emotion_confidence: 80.0,
            eyes_detected: eye_count > 0,
            eye_count,
            eye_positions: xs.iter().map(|&x| (x, 0.4)).collect(),
            blink_rate_category: blink,
        }
    }

    fn classify(s: &FrameSignals) -> FocusState {
        FocusClassifier::default().classify(s)
    }

    #[test]
    fn centred_neutral_face_is_focused() {
        let s = signals(Emotion::Neutral, 2, BlinkRateCategory::Normal, &[0.45, 0.55]);
        assert_eq!(classify(&s), FocusState::Focused);
    }

    #[test]
    fn single_eye_is_distracted() {
        let s = signals(Emotion::Neutral, 1, BlinkRateCategory::Normal, &[0.5]);
        assert_eq!(classify(&s), FocusState::Distracted);
        assert_eq!(FocusClassifier::default().decide(&s).name, "single-eye");
    }

    #[test]
    fn drowsy_blink_rate_beats_happy() {
        let s = signals(Emotion::Happy, 2, BlinkRateCategory::Drowsy, &[0.5, 0.5]);
        assert_eq!(classify(&s), FocusState::Drowsy);
    }

    #[test]
    fn off_centre_gaze_is_distracted() {
        let s = signals(Emotion::Neutral, 2, BlinkRateCategory::Normal, &[0.8, 0.9]);
        assert_eq!(classify(&s), FocusState::Distracted);
        assert_eq!(FocusClassifier::default().decide(&s).name, "gaze-off-centre");
    }

    #[test]
    fn gaze_band_edges_are_centred() {
        let left = signals(Emotion::Neutral, 2, BlinkRateCategory::Normal, &[0.3, 0.3]);
        let right = signals(Emotion::Neutral, 2, BlinkRateCategory::Normal, &[0.7, 0.7]);
        assert_eq!(classify(&left), FocusState::Focused);
        assert_eq!(classify(&right), FocusState::Focused);
    }

    #[test]
    fn missing_positions_skip_the_gaze_rule() {
        let s = signals(Emotion::Angry, 2, BlinkRateCategory::Tired, &[]);
        assert_eq!(classify(&s), FocusState::Focused);
    }

    #[test]
    fn emotion_rules_map_as_listed() {
        let centred = [0.5, 0.5];
        let cases = [
            (Emotion::Happy, FocusState::Distracted),
            (Emotion::Neutral, FocusState::Focused),
            (Emotion::Angry, FocusState::Focused),
            (Emotion::Sad, FocusState::Drowsy),
            (Emotion::Fear, FocusState::Neutral),
            (Emotion::Disgust, FocusState::Neutral),
            (Emotion::Surprise, FocusState::Neutral),
            (Emotion::Other("contempt".to_string()), FocusState::Neutral),
        ];
        for (emotion, expected) in cases {
            let s = signals(emotion.clone(), 2, BlinkRateCategory::Normal, &centred);
            assert_eq!(classify(&s), expected, "emotion {emotion}");
        }
    }

    #[test]
    fn eyes_flag_overrides_eye_count() {
        let mut s = signals(Emotion::Neutral, 2, BlinkRateCategory::Normal, &[0.5, 0.5]);
        s.eyes_detected = false;
        assert_eq!(FocusClassifier::default().decide(&s).name, "no-eyes");
    }

    #[test]
    fn default_gaze_band_follows_engine_config() {
        let config = EngineConfig::default();
        let band = GazeBand::default();
        assert_eq!(band, GazeBand::from(&config));
        assert_eq!((band.min_x, band.max_x), (config.gaze_min_x, config.gaze_max_x));
        assert_eq!(FocusClassifier::default().gaze, FocusClassifier::new(&config).gaze);
    }

    #[test]
    fn rules_end_with_a_catch_all() {
        let last = FOCUS_RULES.last().unwrap();
        assert_eq!(last.state, FocusState::Neutral);
        let s = signals(Emotion::None, 0, BlinkRateCategory::Normal, &[]);
        assert!(last.applies(&s, &GazeBand::default()));
    }

    fn any_emotion() -> impl Strategy<Value = Emotion> {
        prop_oneof![
            Just(Emotion::Angry),
            Just(Emotion::Disgust),
            Just(Emotion::Fear),
            Just(Emotion::Happy),
            Just(Emotion::Neutral),
            Just(Emotion::Sad),
            Just(Emotion::Surprise),
            Just(Emotion::None),
            "[a-z]{3,8}".prop_map(|label| Emotion::from(label.as_str())),
        ]
    }

    fn any_blink() -> impl Strategy<Value = BlinkRateCategory> {
        prop_oneof![
            Just(BlinkRateCategory::Drowsy),
            Just(BlinkRateCategory::Tired),
            Just(BlinkRateCategory::Normal),
        ]
    }

    proptest! {
        #[test]
        fn no_eyes_is_always_distracted(
            emotion in any_emotion(),
            blink in any_blink(),
            eyes_detected in any::<bool>(),
            xs in proptest::collection::vec(0.0f64..1.0, 0..4),
        ) {
            let s = FrameSignals {
                emotion,
                emotion_confidence: 50.0,
                eyes_detected,
                eye_count: 0,
                eye_positions: xs.into_iter().map(|x| (x, 0.5)).collect(),
                blink_rate_category: blink,
            };
            prop_assert_eq!(classify(&s), FocusState::Distracted);
        }

        #[test]
        fn classification_is_deterministic(
            emotion in any_emotion(),
            blink in any_blink(),
            eye_count in 0usize..4,
            xs in proptest::collection::vec(0.0f64..1.0, 0..4),
        ) {
            let s = FrameSignals {
                emotion,
                emotion_confidence: 50.0,
                eyes_detected: eye_count > 0,
                eye_count,
                eye_positions: xs.into_iter().map(|x| (x, 0.5)).collect(),
                blink_rate_category: blink,
            };
            let classifier = FocusClassifier::default();
            prop_assert_eq!(classifier.classify(&s), classifier.classify(&s.clone()));
        }
    }
}
