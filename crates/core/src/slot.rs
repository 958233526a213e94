//! Slot match results and extraction provenance

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Confidence values closer than this are treated as a tie
const CONFIDENCE_EPSILON: f32 = 1e-6;

/// Strategy that produced a slot value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Pre-authored special case (ambiguous or meta request)
    SpecialCaseKnowledge,
    /// Direct reply to a previously offered multiple-choice question
    OptionSelection,
    /// Keyword / regex / similarity matching against the schema
    PatternMatch,
    /// External classifier picked the slot
    Classification,
    /// Implied by a dependency rule
    DependencyInference,
    /// Filled from the schema default when elicitation gave up
    DefaultValue,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::SpecialCaseKnowledge => "special_case_knowledge",
            ExtractionMethod::OptionSelection => "option_selection",
            ExtractionMethod::PatternMatch => "pattern_match",
            ExtractionMethod::Classification => "classification_assisted",
            ExtractionMethod::DependencyInference => "dependency_inference",
            ExtractionMethod::DefaultValue => "default_value",
        }
    }

    /// Tie-break rank between strategies; lower wins
    pub fn priority(&self) -> u8 {
        match self {
            ExtractionMethod::SpecialCaseKnowledge => 0,
            ExtractionMethod::OptionSelection => 1,
            ExtractionMethod::PatternMatch => 2,
            ExtractionMethod::Classification => 3,
            ExtractionMethod::DependencyInference => 4,
            ExtractionMethod::DefaultValue => 5,
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Matched text span, in char offsets of the normalized utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A resolved (slot, value) candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Slot name
    pub slot: String,
    /// Canonical value (an allowed-value id for enumerated slots)
    pub value: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Strategy that produced the match
    pub method: ExtractionMethod,
    /// Matched span, if the strategy can point at one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<MatchSpan>,
    /// Runner-up values that scored within the ambiguity margin
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<(String, f32)>,
}

impl MatchResult {
    pub fn new(
        slot: impl Into<String>,
        value: impl Into<String>,
        confidence: f32,
        method: ExtractionMethod,
    ) -> Self {
        Self {
            slot: slot.into(),
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            method,
            span: None,
            alternatives: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: MatchSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<(String, f32)>) -> Self {
        self.alternatives = alternatives;
        self
    }

    /// Whether the match is ambiguous between several values
    pub fn is_ambiguous(&self) -> bool {
        !self.alternatives.is_empty()
    }

    /// Higher confidence wins; equal confidence falls back to strategy priority
    pub fn outranks(&self, other: &MatchResult) -> bool {
        if (self.confidence - other.confidence).abs() <= CONFIDENCE_EPSILON {
            self.method.priority() < other.method.priority()
        } else {
            self.confidence > other.confidence
        }
    }
}

/// Insert a candidate, keeping only the best match per slot
pub fn insert_best(matches: &mut HashMap<String, MatchResult>, candidate: MatchResult) {
    match matches.get(&candidate.slot) {
        Some(existing) if !candidate.outranks(existing) => {},
        _ => {
            matches.insert(candidate.slot.clone(), candidate);
        },
    }
}
