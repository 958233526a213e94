//! Learned pattern records produced by dynamic learning

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance tag carried by every learned record
pub const DYNAMIC_LEARNING_SOURCE: &str = "dynamic_learning";

/// A (slot, value) pattern registered at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPatternRecord {
    pub slot: String,
    pub value: String,
    /// Regex synthesised from the example text
    pub pattern: String,
    /// Utterance the value was learned from
    pub example_text: String,
    pub confidence: f32,
    pub learned_at: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    DYNAMIC_LEARNING_SOURCE.to_string()
}

impl LearnedPatternRecord {
    pub fn new(
        slot: impl Into<String>,
        value: impl Into<String>,
        pattern: impl Into<String>,
        example_text: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            slot: slot.into(),
            value: value.into(),
            pattern: pattern.into(),
            example_text: example_text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            learned_at: Utc::now(),
            source: default_source(),
        }
    }

    /// Whether this record is for the given (slot, value) pair
    pub fn is_for(&self, slot: &str, value: &str) -> bool {
        self.slot == slot && self.value.eq_ignore_ascii_case(value)
    }
}
