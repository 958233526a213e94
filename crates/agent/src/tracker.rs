//! Slot writes with change history
//!
//! Every slot write during a turn goes through [`apply_match`], which
//! updates the session and returns a [`StateChange`] describing what
//! happened. The engine reports the changes of a turn to its caller.

use advisor_core::{ExtractionMethod, FilledSlot, MatchResult, SessionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of a state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub timestamp: DateTime<Utc>,
    pub slot_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub confidence: f32,
    pub source: ChangeSource,
    /// User turn index
    pub turn_index: usize,
}

/// Source of a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// Extracted from the user utterance
    UserUtterance,
    /// User replaced an earlier value
    Correction,
    /// Implied by a matched special case
    SpecialCase,
    /// Implied by a dependency rule
    DependencyInference,
    /// Schema default or suggestion used when elicitation gave up
    Default,
}

impl ChangeSource {
    fn for_method(method: ExtractionMethod, overwrite: bool) -> Self {
        match method {
            ExtractionMethod::SpecialCaseKnowledge => ChangeSource::SpecialCase,
            ExtractionMethod::DependencyInference => ChangeSource::DependencyInference,
            ExtractionMethod::DefaultValue => ChangeSource::Default,
            _ if overwrite => ChangeSource::Correction,
            _ => ChangeSource::UserUtterance,
        }
    }
}

/// Write a match into the session
///
/// Returns `None` when the slot already holds the same value.
pub fn apply_match(state: &mut SessionState, result: &MatchResult, turn_index: usize) -> Option<StateChange> {
    let old_value = state.slot_value(&result.slot).map(str::to_string);
    if old_value.as_deref() == Some(result.value.as_str()) {
        return None;
    }

    let source = ChangeSource::for_method(result.method, old_value.is_some());
    tracing::debug!(
        slot = %result.slot,
        old = ?old_value,
        new = %result.value,
        confidence = result.confidence,
        source = ?source,
        "Slot updated"
    );
    state.fill_slot(FilledSlot::from_match(result, turn_index));

    Some(StateChange {
        timestamp: Utc::now(),
        slot_name: result.slot.clone(),
        old_value,
        new_value: Some(result.value.clone()),
        confidence: result.confidence,
        source,
        turn_index,
    })
}
