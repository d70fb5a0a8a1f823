use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Emotion labels in the order the classifier model emits its scores.
pub const EMOTION_ORDER: [Emotion; 7] = [
    Emotion::Angry,
    Emotion::Disgust,
    Emotion::Fear,
    Emotion::Happy,
    Emotion::Neutral,
    Emotion::Sad,
    Emotion::Surprise,
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
    /// No face in the frame.
    None,
    Other(String),
}

impl Emotion {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Angry => "angry",
            Self::Disgust => "disgust",
            Self::Fear => "fear",
            Self::Happy => "happy",
            Self::Neutral => "neutral",
            Self::Sad => "sad",
            Self::Surprise => "surprise",
            Self::None => "none",
            Self::Other(label) => label,
        }
    }
}

impl From<&str> for Emotion {
    fn from(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "angry" => Self::Angry,
            "disgust" => Self::Disgust,
            "fear" => Self::Fear,
            "happy" => Self::Happy,
            "neutral" => Self::Neutral,
            "sad" => Self::Sad,
            "surprise" => Self::Surprise,
            "none" | "" => Self::None,
            _ => Self::Other(label.trim().to_string()),
        }
    }
}

impl From<String> for Emotion {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<Emotion> for String {
    fn from(emotion: Emotion) -> Self {
        emotion.as_str().to_string()
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlinkRateCategory {
    Drowsy,
    Tired,
    Normal,
}

impl BlinkRateCategory {
    pub const ALL: [BlinkRateCategory; 3] = [Self::Drowsy, Self::Tired, Self::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drowsy => "drowsy",
            Self::Tired => "tired",
            Self::Normal => "normal",
        }
    }
}

impl fmt::Display for BlinkRateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusState {
    Focused,
    Distracted,
    Drowsy,
    Neutral,
}

impl FocusState {
    pub const ALL: [FocusState; 4] = [Self::Focused, Self::Distracted, Self::Drowsy, Self::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Focused => "focused",
            Self::Distracted => "distracted",
            Self::Drowsy => "drowsy",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for FocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected eye, normalized to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeObservation {
    pub center_x: f64,
    pub center_y: f64,
    pub aspect_ratio: f64,
}

/// Everything the focus classifier looks at for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSignals {
    pub emotion: Emotion,
    pub emotion_confidence: f64,
    pub eyes_detected: bool,
    pub eye_count: usize,
    pub eye_positions: Vec<(f64, f64)>,
    pub blink_rate_category: BlinkRateCategory,
}

/// One row of the persisted session log. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub elapsed_seconds: u64,
    #[serde(deserialize_with = "lenient_bool::deserialize")]
    pub eyes_detected: bool,
    #[serde(rename = "num_eyes")]
    pub eye_count: usize,
    pub emotion: Emotion,
    pub confidence: f64,
    #[serde(rename = "blink_state")]
    pub blink_rate_category: BlinkRateCategory,
    #[serde(rename = "blinks_per_min")]
    pub blinks_per_minute: usize,
    pub focus_state: FocusState,
}

pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Accepts `true`/`false` in any case plus `1`/`0`, as written by
/// spreadsheet tools and pandas.
pub mod lenient_bool {
    use serde::{self, Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<bool> {
        match raw.trim() {
            "1" => Some(true),
            "0" => Some(false),
            other if other.eq_ignore_ascii_case("true") => Some(true),
            other if other.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid boolean `{raw}`")))
    }
}

/// Pixel rectangle from the face/eye detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FaceDetection {
    #[serde(flatten)]
    pub bounds: BoundingBox,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Raw model probabilities in `EMOTION_ORDER`.
    #[serde(default)]
    pub scores: Option<Vec<f64>>,
    /// Eye boxes relative to the face box.
    #[serde(default)]
    pub eyes: Vec<BoundingBox>,
}

/// Detector output for one camera frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameObservation {
    /// Seconds since session start. Live clock is used when absent.
    #[serde(default)]
    pub t: Option<f64>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub faces: Vec<FaceDetection>,
}

impl FaceDetection {
    /// Emotion label and confidence percentage for this face.
    ///
    /// An explicit label wins; otherwise the argmax of `scores` is used.
    pub fn emotion_prediction(&self) -> (Emotion, f64) {
        if let Some(label) = &self.emotion {
            return (Emotion::from(label.as_str()), self.confidence.unwrap_or(0.0));
        }

        let best = self.scores.as_deref().and_then(|scores| {
            scores
                .iter()
                .take(EMOTION_ORDER.len())
                .enumerate()
                .fold(None, |best: Option<(usize, f64)>, (idx, &score)| match best {
                    Some((_, top)) if top >= score => best,
                    _ => Some((idx, score)),
                })
        });

        match best {
            Some((idx, score)) => (EMOTION_ORDER[idx].clone(), score * 100.0),
            None => (Emotion::None, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_labels_parse_case_insensitively() {
        assert_eq!(Emotion::from("Happy"), Emotion::Happy);
        assert_eq!(Emotion::from(" neutral "), Emotion::Neutral);
        assert_eq!(Emotion::from(""), Emotion::None);
        assert_eq!(Emotion::from("contempt"), Emotion::Other("contempt".to_string()));
        assert_eq!(Emotion::from("contempt").to_string(), "contempt");
    }

    #[test]
    fn scores_pick_the_most_likely_emotion() {
        let face = FaceDetection {
            scores: Some(vec![0.05, 0.0, 0.1, 0.05, 0.7, 0.05, 0.05]),
            ..FaceDetection::default()
        };
        let (emotion, confidence) = face.emotion_prediction();
        assert_eq!(emotion, Emotion::Neutral);
        assert!((confidence - 70.0).abs() < 1e-9);
    }

    #[test]
    fn explicit_label_overrides_scores() {
        let face = FaceDetection {
            emotion: Some("sad".to_string()),
            confidence: Some(55.5),
            scores: Some(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            ..FaceDetection::default()
        };
        assert_eq!(face.emotion_prediction(), (Emotion::Sad, 55.5));
    }

    #[test]
    fn face_without_prediction_falls_back_to_none() {
        assert_eq!(FaceDetection::default().emotion_prediction(), (Emotion::None, 0.0));
    }

    #[test]
    fn frame_observation_parses_detector_json() {
        let raw = r#"{"t":1.5,"width":640,"height":480,"faces":[
            {"x":100,"y":80,"w":200,"h":200,"emotion":"angry","confidence":61.2,
             "eyes":[{"x":40,"y":50,"w":30,"h":20}]}
        ]}"#;
        let frame: FrameObservation = serde_json::from_str(raw).unwrap();
        assert_eq!(frame.t, Some(1.5));
        assert_eq!(frame.faces.len(), 1);
        assert_eq!(frame.faces[0].bounds.w, 200);
        assert_eq!(frame.faces[0].eyes[0], BoundingBox { x: 40, y: 50, w: 30, h: 20 });
    }

    #[test]
    fn booleans_parse_leniently() {
        assert_eq!(lenient_bool::parse("True"), Some(true));
        assert_eq!(lenient_bool::parse("FALSE"), Some(false));
        assert_eq!(lenient_bool::parse(" 1 "), Some(true));
        assert_eq!(lenient_bool::parse("0"), Some(false));
        assert_eq!(lenient_bool::parse("yes"), None);
    }
}
