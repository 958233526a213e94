//! Dialogue session state
//!
//! The mutable record of one conversation. A session is owned by its
//! identifier for the duration of a turn; callers serialize turns per
//! session, so nothing here is internally synchronized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::conversation::{DialogueStage, Turn};
use crate::slot::{ExtractionMethod, MatchResult};

/// A slot value together with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledSlot {
    pub slot: String,
    pub value: String,
    pub confidence: f32,
    /// Strategy that filled the slot
    pub method: ExtractionMethod,
    /// User turn index that filled the slot
    pub turn: usize,
    pub filled_at: DateTime<Utc>,
}

impl FilledSlot {
    pub fn from_match(result: &MatchResult, turn: usize) -> Self {
        Self {
            slot: result.slot.clone(),
            value: result.value.clone(),
            confidence: result.confidence,
            method: result.method,
            turn,
            filled_at: Utc::now(),
        }
    }
}

/// One option offered in a multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOption {
    /// Allowed-value id
    pub id: String,
    /// Label shown to the user
    pub label: String,
}

/// Options offered by the last elicitation question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferedOptions {
    pub slot: String,
    pub options: Vec<SlotOption>,
}

/// Accumulated effects of dependency rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEffects {
    /// Slots now required regardless of their schema flag
    #[serde(default)]
    pub required: BTreeSet<String>,
    /// Required slots that no longer need to be asked
    #[serde(default)]
    pub optional: BTreeSet<String>,
    /// Restricted allowed values per slot
    #[serde(default)]
    pub narrowed: BTreeMap<String, Vec<String>>,
    /// Soft defaults used if elicitation gives up
    #[serde(default)]
    pub suggested: BTreeMap<String, String>,
}

/// State of one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Ordered, role-tagged turn history
    #[serde(default)]
    pub turns: Vec<Turn>,
    /// Filled slots in fill order
    #[serde(default)]
    slots: Vec<FilledSlot>,
    /// Repeat counter keyed by normalized-query hash
    #[serde(default)]
    pub loop_counters: HashMap<u64, u32>,
    #[serde(default)]
    pub stage: DialogueStage,
    /// Times each slot has been asked for
    #[serde(default)]
    pub elicitation_counts: HashMap<String, u32>,
    /// Options offered by the last question, if any
    #[serde(default)]
    pub last_options: Option<OfferedOptions>,
    /// Slots the last question asked for
    #[serde(default)]
    pub pending_slots: Vec<String>,
    #[serde(default)]
    pub effects: DependencyEffects,
    /// Special cases matched during this session
    #[serde(default)]
    pub special_cases: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Create an empty session for an identifier
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
            slots: Vec::new(),
            loop_counters: HashMap::new(),
            stage: DialogueStage::Collecting,
            elicitation_counts: HashMap::new(),
            last_options: None,
            pending_slots: Vec::new(),
            effects: DependencyEffects::default(),
            special_cases: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Filled slots in fill order
    pub fn filled_slots(&self) -> &[FilledSlot] {
        &self.slots
    }

    pub fn get_slot(&self, slot: &str) -> Option<&FilledSlot> {
        self.slots.iter().find(|s| s.slot == slot)
    }

    pub fn slot_value(&self, slot: &str) -> Option<&str> {
        self.get_slot(slot).map(|s| s.value.as_str())
    }

    pub fn has_slot(&self, slot: &str) -> bool {
        self.get_slot(slot).is_some()
    }

    /// Fill or overwrite a slot; an overwrite keeps the original fill position
    pub fn fill_slot(&mut self, filled: FilledSlot) {
        self.updated_at = Utc::now();
        match self.slots.iter_mut().find(|s| s.slot == filled.slot) {
            Some(existing) => *existing = filled,
            None => self.slots.push(filled),
        }
    }

    pub fn remove_slot(&mut self, slot: &str) -> Option<FilledSlot> {
        let idx = self.slots.iter().position(|s| s.slot == slot)?;
        self.updated_at = Utc::now();
        Some(self.slots.remove(idx))
    }

    /// Slot values keyed by slot name
    pub fn slot_map(&self) -> BTreeMap<String, String> {
        self.slots
            .iter()
            .map(|s| (s.slot.clone(), s.value.clone()))
            .collect()
    }

    /// Slot records keyed by slot name
    pub fn slot_records(&self) -> HashMap<String, FilledSlot> {
        self.slots
            .iter()
            .map(|s| (s.slot.clone(), s.clone()))
            .collect()
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn.with_stage(self.stage));
    }

    /// Number of user turns so far
    pub fn user_turn_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.role == crate::conversation::TurnRole::User)
            .count()
    }

    /// Record a normalized-query hash, returning how often it has now been seen
    pub fn record_query(&mut self, query_hash: u64) -> u32 {
        let count = self.loop_counters.entry(query_hash).or_insert(0);
        *count += 1;
        *count
    }

    pub fn elicitation_count(&self, slot: &str) -> u32 {
        self.elicitation_counts.get(slot).copied().unwrap_or(0)
    }

    pub fn note_elicitation(&mut self, slot: &str) -> u32 {
        let count = self.elicitation_counts.entry(slot.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn note_special_case(&mut self, case_id: &str) {
        if !self.special_cases.iter().any(|c| c == case_id) {
            self.special_cases.push(case_id.to_string());
        }
    }
}
