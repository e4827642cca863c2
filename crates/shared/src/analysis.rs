//! Data exchanged with the analysis and scoring operations.
//!
//! The closed option lists live here, outside the engine, so that a UI can
//! render them without depending on workflow internals.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DOPAMINE_FACTORS: &[&str] = &[
    "No Dominant Factor",
    "Repetitive Music/Audio",
    "Catchy/Melodic Music",
    "Element of Surprise",
    "On-screen Positive Feedback",
    "Game-like Progression",
    "Familiar Characters",
    "Distinctive Sound Effects",
    "Engaging Narrative",
    "Visual Effects",
    "Unique Animation Style",
    "Creative Elements",
];

pub const DOMINANT_COLORS: &[&str] = &[
    "No Dominant Color",
    "Multi Colors",
    "Blue",
    "Pink",
    "White",
    "Violet",
    "Peach",
    "Green",
    "Red",
    "Yellow",
    "Orange",
    "Brown",
    "Black",
    "Grey",
    "Purple",
];

pub const VIDEO_CATEGORIES: &[&str] = &[
    "Advertisement",
    "Country Vlog",
    "Documentary",
    "Education",
    "Entertainment",
    "Food Vlog",
    "Gaming",
    "Informative",
    "Inspirational",
    "Motivational",
    "Music",
    "Nature",
    "Nursery Rhymes",
    "Short Story",
    "Shots",
    "Tourism",
    "Travel Vlog",
    "Vlog",
];

const FLAG_VALUES: &[&str] = &["0", "1"];

/// Maximum drift allowed between `probability_low + probability_high` and 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },
}

/// Keys of [`ManualAttributes`], named as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeField {
    FreqCutPerVideo,
    IsForKids,
    KeyDopamineFactor,
    DominantColor,
    VideoCategory,
}

impl AttributeField {
    pub const ALL: [AttributeField; 5] = [
        AttributeField::FreqCutPerVideo,
        AttributeField::IsForKids,
        AttributeField::KeyDopamineFactor,
        AttributeField::DominantColor,
        AttributeField::VideoCategory,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            AttributeField::FreqCutPerVideo => "freq_cut_per_video",
            AttributeField::IsForKids => "is_for_kids",
            AttributeField::KeyDopamineFactor => "key_dopamine_factor",
            AttributeField::DominantColor => "dominant_color",
            AttributeField::VideoCategory => "video_category",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key.trim())
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttributeField::FreqCutPerVideo => "Frequent Cuts (0 or 1)",
            AttributeField::IsForKids => "Is For Kids (0 or 1)",
            AttributeField::KeyDopamineFactor => "Key Dopamine Factor",
            AttributeField::DominantColor => "Dominant Color",
            AttributeField::VideoCategory => "Video Category",
        }
    }

    /// Every value the field accepts, in display order.
    pub fn choices(&self) -> &'static [&'static str] {
        match self {
            AttributeField::FreqCutPerVideo | AttributeField::IsForKids => FLAG_VALUES,
            AttributeField::KeyDopamineFactor => DOPAMINE_FACTORS,
            AttributeField::DominantColor => DOMINANT_COLORS,
            AttributeField::VideoCategory => VIDEO_CATEGORIES,
        }
    }
}

/// User-supplied details merged into the prediction request.
///
/// Fields are private so that every stored value is a member of its
/// enumeration; the only way in is [`ManualAttributes::set`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualAttributes {
    freq_cut_per_video: u8,
    is_for_kids: u8,
    key_dopamine_factor: &'static str,
    dominant_color: &'static str,
    video_category: &'static str,
}

impl Default for ManualAttributes {
    fn default() -> Self {
        Self {
            freq_cut_per_video: 0,
            is_for_kids: 0,
            key_dopamine_factor: DOPAMINE_FACTORS[0],
            dominant_color: DOMINANT_COLORS[0],
            video_category: VIDEO_CATEGORIES[0],
        }
    }
}

impl ManualAttributes {
    /// Set one field. Enumerated values match case-insensitively and are
    /// stored in their canonical spelling.
    pub fn set(&mut self, field: AttributeField, value: &str) -> Result<(), AttributeError> {
        let invalid = || AttributeError::InvalidValue {
            field: field.key(),
            value: value.to_string(),
        };
        match field {
            AttributeField::FreqCutPerVideo => {
                self.freq_cut_per_video = parse_flag(value).ok_or_else(invalid)?
            }
            AttributeField::IsForKids => self.is_for_kids = parse_flag(value).ok_or_else(invalid)?,
            AttributeField::KeyDopamineFactor => {
                self.key_dopamine_factor = canonical(DOPAMINE_FACTORS, value).ok_or_else(invalid)?
            }
            AttributeField::DominantColor => {
                self.dominant_color = canonical(DOMINANT_COLORS, value).ok_or_else(invalid)?
            }
            AttributeField::VideoCategory => {
                self.video_category = canonical(VIDEO_CATEGORIES, value).ok_or_else(invalid)?
            }
        }
        Ok(())
    }

    /// Same as [`set`](Self::set) but addressed by wire key.
    pub fn set_by_key(&mut self, key: &str, value: &str) -> Result<(), AttributeError> {
        let field =
            AttributeField::from_key(key).ok_or_else(|| AttributeError::UnknownField(key.into()))?;
        self.set(field, value)
    }

    /// Current value of a field, rendered as it would be entered.
    pub fn get(&self, field: AttributeField) -> String {
        match field {
            AttributeField::FreqCutPerVideo => self.freq_cut_per_video.to_string(),
            AttributeField::IsForKids => self.is_for_kids.to_string(),
            AttributeField::KeyDopamineFactor => self.key_dopamine_factor.to_string(),
            AttributeField::DominantColor => self.dominant_color.to_string(),
            AttributeField::VideoCategory => self.video_category.to_string(),
        }
    }
}

fn parse_flag(value: &str) -> Option<u8> {
    match value.trim().to_ascii_lowercase().as_str() {
        "0" | "false" => Some(0),
        "1" | "true" => Some(1),
        _ => None,
    }
}

fn canonical(choices: &'static [&'static str], value: &str) -> Option<&'static str> {
    let value = value.trim();
    choices
        .iter()
        .copied()
        .find(|choice| choice.eq_ignore_ascii_case(value))
}

/// What the analyze-url operation returns about a video.
///
/// Only the title and channel are interpreted; every other field is kept
/// verbatim and sent back with the prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSubject {
    #[serde(rename = "video_title", default)]
    pub title: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Build the predict payload: subject fields overlaid with the manual
/// attributes. Attributes win on key collisions.
pub fn prediction_payload(
    subject: &AnalysisSubject,
    attributes: &ManualAttributes,
) -> Result<Value, serde_json::Error> {
    let mut merged = Map::new();
    for part in [serde_json::to_value(subject)?, serde_json::to_value(attributes)?] {
        if let Value::Object(fields) = part {
            merged.extend(fields);
        }
    }
    Ok(Value::Object(merged))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub final_label: String,
    pub probability_low: f64,
    pub probability_high: f64,
}

impl PredictionResult {
    /// Both probabilities lie in [0, 1] and sum to 1 within
    /// [`PROBABILITY_TOLERANCE`].
    pub fn is_consistent(&self) -> bool {
        let in_range = |p: f64| (0.0..=1.0).contains(&p);
        in_range(self.probability_low)
            && in_range(self.probability_high)
            && (self.probability_low + self.probability_high - 1.0).abs() <= PROBABILITY_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_match_first_choices() {
        let attrs = ManualAttributes::default();
        assert_eq!(attrs.get(AttributeField::FreqCutPerVideo), "0");
        assert_eq!(attrs.get(AttributeField::KeyDopamineFactor), "No Dominant Factor");
        assert_eq!(attrs.get(AttributeField::DominantColor), "No Dominant Color");
        assert_eq!(attrs.get(AttributeField::VideoCategory), "Advertisement");
    }

    #[test]
    fn test_set_is_case_insensitive_and_canonicalizes() {
        let mut attrs = ManualAttributes::default();
        attrs.set_by_key("dominant_color", "  violet ").unwrap();
        attrs.set_by_key("video_category", "TRAVEL VLOG").unwrap();
        attrs.set_by_key("is_for_kids", "true").unwrap();
        assert_eq!(attrs.get(AttributeField::DominantColor), "Violet");
        assert_eq!(attrs.get(AttributeField::VideoCategory), "Travel Vlog");
        assert_eq!(attrs.get(AttributeField::IsForKids), "1");
    }

    #[test]
    fn test_set_rejects_values_outside_enumeration() {
        let mut attrs = ManualAttributes::default();
        assert_eq!(
            attrs.set_by_key("freq_cut_per_video", "2"),
            Err(AttributeError::InvalidValue {
                field: "freq_cut_per_video",
                value: "2".into()
            })
        );
        assert!(attrs.set_by_key("dominant_color", "Magenta").is_err());
        assert_eq!(
            attrs.set_by_key("video_title", "x"),
            Err(AttributeError::UnknownField("video_title".into()))
        );
        assert_eq!(attrs, ManualAttributes::default());
    }

    #[test]
    fn test_subject_keeps_unknown_fields() {
        let raw = json!({
            "video_title": "Baby Shark Dance",
            "channel_name": "Pinkfong",
            "log_view_count": 23.1,
            "publish_year": 2016
        });
        let subject: AnalysisSubject = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(subject.title, "Baby Shark Dance");
        assert_eq!(subject.channel_name, "Pinkfong");
        assert_eq!(serde_json::to_value(&subject).unwrap(), raw);
    }

    #[test]
    fn test_prediction_payload_overlays_attributes() {
        let subject: AnalysisSubject = serde_json::from_value(json!({
            "video_title": "Clip",
            "channel_name": "Chan",
            "title_word_count": 1,
            "dominant_color": "stale"
        }))
        .unwrap();
        let mut attrs = ManualAttributes::default();
        attrs.set(AttributeField::DominantColor, "Red").unwrap();

        let payload = prediction_payload(&subject, &attrs).unwrap();
        assert_eq!(payload["video_title"], "Clip");
        assert_eq!(payload["title_word_count"], 1);
        assert_eq!(payload["dominant_color"], "Red");
        assert_eq!(payload["freq_cut_per_video"], 0);
        assert_eq!(payload["video_category"], "Advertisement");
    }

    #[test]
    fn test_prediction_consistency() {
        let ok = PredictionResult {
            final_label: "High Dopamine".into(),
            probability_low: 0.2,
            probability_high: 0.8,
        };
        assert!(ok.is_consistent());

        let off = PredictionResult {
            probability_high: 0.7,
            ..ok.clone()
        };
        assert!(!off.is_consistent());

        let out_of_range = PredictionResult {
            probability_low: -0.5,
            probability_high: 1.5,
            ..ok
        };
        assert!(!out_of_range.is_consistent());
    }
}
