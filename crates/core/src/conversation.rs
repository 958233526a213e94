//! Conversation types including dialogue stages and turns

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dialogue stage of one recommendation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStage {
    /// Eliciting required slots
    #[default]
    Collecting,
    /// Enough information to search the catalog
    Ready,
    /// Waiting for the user to disambiguate a previous answer
    Clarifying,
}

static STAGE_TRANSITIONS: Lazy<HashMap<DialogueStage, &'static [DialogueStage]>> =
    Lazy::new(|| {
        use DialogueStage::*;
        let mut map = HashMap::new();
        map.insert(Collecting, &[Ready, Clarifying] as &[_]);
        map.insert(Ready, &[Collecting] as &[_]);
        map.insert(Clarifying, &[Collecting, Ready] as &[_]);
        map
    });

impl DialogueStage {
    /// Get allowed transitions from current stage
    pub fn allowed_transitions(&self) -> &'static [DialogueStage] {
        STAGE_TRANSITIONS.get(self).copied().unwrap_or(&[])
    }

    /// Check if transition to target stage is allowed
    pub fn can_transition_to(&self, target: DialogueStage) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Stages entered on the way to `target`, `target` last
    ///
    /// A move the table forbids goes through `Collecting` when both legs
    /// are allowed; `None` if there is no such route.
    pub fn route_to(&self, target: DialogueStage) -> Option<Vec<DialogueStage>> {
        if *self == target {
            return Some(Vec::new());
        }
        if self.can_transition_to(target) {
            return Some(vec![target]);
        }
        let via = DialogueStage::Collecting;
        (self.can_transition_to(via) && via.can_transition_to(target)).then(|| vec![via, target])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueStage::Collecting => "collecting",
            DialogueStage::Ready => "ready",
            DialogueStage::Clarifying => "clarifying",
        }
    }
}

impl std::fmt::Display for DialogueStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// User message
    User,
    /// Assistant message (questions, clarifications)
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the speaker
    pub role: TurnRole,
    /// Content of the turn
    pub content: String,
    /// When the turn occurred
    pub timestamp: DateTime<Utc>,
    /// Stage the dialogue was in when the turn was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<DialogueStage>,
}

impl Turn {
    /// Create a new turn
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            stage: None,
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    /// Tag the turn with the dialogue stage
    pub fn with_stage(mut self, stage: DialogueStage) -> Self {
        self.stage = Some(stage);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions() {
        assert!(DialogueStage::Collecting.can_transition_to(DialogueStage::Ready));
        assert!(DialogueStage::Collecting.can_transition_to(DialogueStage::Clarifying));
        assert!(DialogueStage::Ready.can_transition_to(DialogueStage::Collecting));
        assert!(!DialogueStage::Ready.can_transition_to(DialogueStage::Clarifying));
    }

    #[test]
    fn test_stage_routes() {
        use DialogueStage::*;
        assert_eq!(Ready.route_to(Ready), Some(vec![]));
        assert_eq!(Ready.route_to(Collecting), Some(vec![Collecting]));
        assert_eq!(Ready.route_to(Clarifying), Some(vec![Collecting, Clarifying]));
        assert_eq!(Clarifying.route_to(Ready), Some(vec![Ready]));

        for from in [Collecting, Ready, Clarifying] {
            for to in [Collecting, Ready, Clarifying] {
                let route = from.route_to(to).unwrap();
                let mut current = from;
                for step in route {
                    assert!(current.can_transition_to(step), "{} -> {}", current, step);
                    current = step;
                }
                assert_eq!(current, to);
            }
        }
    }

    #[test]
    fn test_stage_serde_names() {
        let json = serde_json::to_string(&DialogueStage::Clarifying).unwrap();
        assert_eq!(json, "\"clarifying\"");
        assert_eq!(DialogueStage::default(), DialogueStage::Collecting);
    }
}
