//! Schema-driven slot pattern matcher
//!
//! For every enumerated or range slot the matcher scores each allowed value
//! with three sub-strategies and keeps the best value per slot:
//!
//! | Sub-strategy | Signal | Weight |
//! |---|---|---|
//! | keyword | keyword, display label or synonym contained in the text | 0.95 |
//! | regex | any value pattern matches | 0.85 |
//! | semantic | similarity to an example phrase | 0.70 × similarity |
//!
//! The value score is the strongest signal plus a small bonus for every
//! other sub-strategy that agrees. Range slots also parse amounts and pick
//! the bucket containing the parsed midpoint.
//!
//! Pattern tables are immutable snapshots behind an `RwLock<Arc<_>>`.
//! Learning builds a new snapshot under a single writer mutex and swaps it
//! in, so readers never block on compilation and the next call sees the
//! new value.

use advisor_config::{SchemaConfig, SlotKind};
use advisor_core::{
    ExtractionMethod, LearnedPatternRecord, LearnedPatternStore, MatchResult, MatchSpan,
    SlotOption,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::learning::{propose_candidates, synthesize_pattern};
use crate::normalize::{char_offset, char_slice, find_keyword, normalize};
use crate::numeric::parse_range;
use crate::similarity::phrase_similarity;
use crate::store::InMemoryPatternStore;
use crate::table::{PatternIssue, PatternTable, SlotPatterns, ValuePatterns};
use crate::Result;

pub const KEYWORD_WEIGHT: f32 = 0.95;
pub const REGEX_WEIGHT: f32 = 0.85;
pub const SEMANTIC_WEIGHT: f32 = 0.70;
/// Added per extra sub-strategy agreeing on a value
pub const AGREEMENT_BONUS: f32 = 0.05;
/// Example similarity below this is ignored
pub const SEMANTIC_FLOOR: f32 = 0.5;
/// Confidence given to learned values unless configured otherwise
pub const DEFAULT_LEARNED_CONFIDENCE: f32 = 0.6;

/// Per-call matcher options
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Propose and register unseen values for learnable slots
    pub enable_learning: bool,
}

impl MatchOptions {
    pub fn learning() -> Self {
        Self {
            enable_learning: true,
        }
    }
}

/// Result of one `match_text` call
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Best match per slot, in slot priority order
    pub matches: Vec<MatchResult>,
    pub total_matches: usize,
    /// Records registered by this call
    pub learned: Vec<LearnedPatternRecord>,
}

impl MatchOutcome {
    pub fn get(&self, slot: &str) -> Option<&MatchResult> {
        self.matches.iter().find(|m| m.slot == slot)
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[derive(Debug, Default)]
struct LearningState {
    records: Vec<LearnedPatternRecord>,
    version: u64,
}

/// Slot pattern matcher with dynamic learning
pub struct PatternMatcher {
    schema: Arc<SchemaConfig>,
    tables: RwLock<Arc<PatternTable>>,
    /// Single writer for learning and reloads
    learning: Mutex<LearningState>,
    store: Arc<dyn LearnedPatternStore>,
    /// Highest record-list version written to the store
    persisted: Arc<Mutex<u64>>,
    learned_confidence: f32,
}

impl PatternMatcher {
    /// Matcher with an in-memory learned-pattern store
    pub fn new(schema: Arc<SchemaConfig>) -> Self {
        let table = PatternTable::build(&schema, &[], 0);
        Self {
            schema,
            tables: RwLock::new(Arc::new(table)),
            learning: Mutex::new(LearningState::default()),
            store: Arc::new(InMemoryPatternStore::new()),
            persisted: Arc::new(Mutex::new(0)),
            learned_confidence: DEFAULT_LEARNED_CONFIDENCE,
        }
    }

    /// Matcher backed by a store; previously learned records are loaded
    pub fn with_store(
        schema: Arc<SchemaConfig>,
        store: Arc<dyn LearnedPatternStore>,
    ) -> Result<Self> {
        let records = store.load()?;
        let table = PatternTable::build(&schema, &records, 0);
        tracing::info!(learned = records.len(), "Pattern matcher initialised");
        Ok(Self {
            schema,
            tables: RwLock::new(Arc::new(table)),
            learning: Mutex::new(LearningState {
                records,
                version: 0,
            }),
            store,
            persisted: Arc::new(Mutex::new(0)),
            learned_confidence: DEFAULT_LEARNED_CONFIDENCE,
        })
    }

    pub fn with_learned_confidence(mut self, confidence: f32) -> Self {
        self.learned_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn schema(&self) -> &Arc<SchemaConfig> {
        &self.schema
    }

    /// Current pattern snapshot
    pub fn snapshot(&self) -> Arc<PatternTable> {
        Arc::clone(&self.tables.read())
    }

    /// Match an utterance against every slot
    pub fn match_text(&self, text: &str, options: &MatchOptions) -> MatchOutcome {
        let normalized = normalize(text);
        if normalized.trim().is_empty() {
            return MatchOutcome::default();
        }

        let table = self.snapshot();
        let mut matches: Vec<MatchResult> = table
            .slots()
            .iter()
            .filter_map(|slot| self.match_slot(&normalized, slot))
            .collect();

        let mut learned = Vec::new();
        if options.enable_learning {
            let filled: Vec<&str> = matches.iter().map(|m| m.slot.as_str()).collect();
            let candidates = propose_candidates(text, &normalized, &table, &filled);
            for candidate in candidates {
                if let Some(record) =
                    self.learn(&candidate.slot, &candidate.value, text, self.learned_confidence)
                {
                    matches.push(
                        MatchResult::new(
                            &candidate.slot,
                            &record.value,
                            record.confidence,
                            ExtractionMethod::PatternMatch,
                        )
                        .with_span(MatchSpan {
                            start: candidate.start,
                            end: candidate.end,
                            text: char_slice(text, candidate.start, candidate.end),
                        }),
                    );
                    learned.push(record);
                }
            }
        }

        tracing::debug!(
            matches = matches.len(),
            learned = learned.len(),
            table_version = table.version(),
            "Pattern match complete"
        );

        MatchOutcome {
            total_matches: matches.len(),
            matches,
            learned,
        }
    }

    fn match_slot(&self, normalized: &str, slot: &SlotPatterns) -> Option<MatchResult> {
        if slot.kind == SlotKind::Text {
            return None;
        }
        let rules = &self.schema.validation_rules;

        let mut scored: Vec<(&ValuePatterns, f32, Option<(usize, usize)>)> = slot
            .values
            .iter()
            .filter_map(|value| score_value(normalized, value).map(|(s, span)| (value, s, span)))
            .collect();

        if slot.kind == SlotKind::NumericRange {
            if let Some(range) = parse_range(normalized) {
                let bucket = range
                    .representative()
                    .and_then(|n| slot.values.iter().find(|v| v.contains(n)));
                if let Some(bucket) = bucket {
                    let span = Some((range.start, range.end));
                    match scored.iter_mut().find(|(v, _, _)| v.id == bucket.id) {
                        Some(entry) if entry.1 < range.confidence => {
                            entry.1 = range.confidence;
                            entry.2 = span;
                        },
                        Some(_) => {},
                        None => scored.push((bucket, range.confidence, span)),
                    }
                }
            }
        }

        scored.retain(|(_, score, _)| *score >= rules.min_confidence);
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let (best, best_score, span) = scored.first().copied()?;

        let alternatives: Vec<(String, f32)> = scored
            .iter()
            .skip(1)
            .filter(|(_, score, _)| best_score - *score <= rules.ambiguity_margin)
            .map(|(v, score, _)| (v.id.clone(), *score))
            .collect();

        tracing::debug!(
            slot = %slot.name,
            value = %best.id,
            confidence = best_score,
            alternatives = alternatives.len(),
            "Slot matched"
        );

        let mut result = MatchResult::new(
            &slot.name,
            &best.id,
            best_score,
            ExtractionMethod::PatternMatch,
        )
        .with_alternatives(alternatives);
        if let Some((start, end)) = span {
            result = result.with_span(MatchSpan {
                start,
                end,
                text: char_slice(normalized, start, end),
            });
        }
        Some(result)
    }

    /// Register a new value for a learnable slot
    ///
    /// Returns `false` when the slot is unknown or not learnable, or the
    /// value is already allowed or learned.
    pub fn add_new_slot(&self, slot: &str, value: &str, example_text: &str, confidence: f32) -> bool {
        self.learn(slot, value, example_text, confidence).is_some()
    }

    fn learn(
        &self,
        slot: &str,
        value: &str,
        example_text: &str,
        confidence: f32,
    ) -> Option<LearnedPatternRecord> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let Some(def) = self.schema.get_slot(slot) else {
            tracing::warn!(slot, value, "Cannot learn value for unknown slot");
            return None;
        };
        if !def.learnable {
            tracing::debug!(slot, value, "Slot is not learnable");
            return None;
        }

        let mut state = self.learning.lock();
        if def.allowed_value(value).is_some() || state.records.iter().any(|r| r.is_for(slot, value))
        {
            tracing::debug!(slot, value, "Value already known");
            return None;
        }

        let record = LearnedPatternRecord::new(
            slot,
            value,
            synthesize_pattern(value),
            example_text,
            confidence,
        );

        state.version += 1;
        let next = self.snapshot().with_learned(&record, state.version);
        *self.tables.write() = Arc::new(next);
        state.records.push(record.clone());

        self.persist(state.records.clone(), state.version);
        tracing::info!(slot, value, pattern = %record.pattern, "Learned new slot value");
        Some(record)
    }

    /// Write the record list without blocking the caller when a Tokio
    /// runtime is available; older snapshots never overwrite newer ones
    fn persist(&self, records: Vec<LearnedPatternRecord>, version: u64) {
        let store = Arc::clone(&self.store);
        let written = Arc::clone(&self.persisted);
        let job = move || {
            let mut last = written.lock();
            if *last >= version {
                return;
            }
            match store.persist(&records) {
                Ok(()) => *last = version,
                Err(e) => tracing::warn!(error = %e, "Failed to persist learned patterns"),
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            },
            Err(_) => job(),
        }
    }

    /// Every learned record so far, oldest first
    pub fn learning_history(&self) -> Vec<LearnedPatternRecord> {
        self.learning.lock().records.clone()
    }

    /// Stored patterns that fail to compile; they are skipped when matching
    pub fn validate_patterns(&self) -> Vec<PatternIssue> {
        self.snapshot().issues().to_vec()
    }

    /// Rebuild the tables from the schema and the store
    pub fn reload(&self) -> Result<usize> {
        let records = self.store.load()?;
        let mut state = self.learning.lock();
        state.version += 1;
        let table = PatternTable::build(&self.schema, &records, state.version);
        *self.tables.write() = Arc::new(table);
        let count = records.len();
        state.records = records;
        tracing::info!(learned = count, "Pattern tables reloaded");
        Ok(count)
    }

    /// Whether `value` is allowed for `slot`, learned values included
    pub fn is_allowed(&self, slot: &str, value: &str) -> bool {
        if self.schema.is_allowed_value(slot, value) {
            return true;
        }
        self.snapshot()
            .slot(slot)
            .map_or(false, |s| s.value(value).is_some())
    }

    /// Allowed values of a slot, learned values included
    pub fn options(&self, slot: &str) -> Vec<SlotOption> {
        self.snapshot().options(slot)
    }

    /// Value of `slot` whose keywords or examples are closest to the text
    ///
    /// No confidence floor applies; used once a classifier has already
    /// settled on the slot.
    pub fn closest_value(&self, slot: &str, text: &str) -> Option<(String, f32)> {
        let normalized = normalize(text);
        let table = self.snapshot();
        let slot = table.slot(slot)?;
        slot.values
            .iter()
            .map(|value| {
                let similarity = value
                    .keywords
                    .iter()
                    .chain(value.examples.iter())
                    .map(|phrase| phrase_similarity(&normalized, phrase))
                    .fold(0.0f32, f32::max);
                (value, similarity)
            })
            .filter(|(_, similarity)| *similarity > 0.0)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(value, similarity)| (value.id.clone(), similarity))
    }
}

/// Score one value against normalised text
fn score_value(normalized: &str, value: &ValuePatterns) -> Option<(f32, Option<(usize, usize)>)> {
    let mut signals: Vec<f32> = Vec::with_capacity(3);
    let mut span = None;

    if let Some(found) = value
        .keywords
        .iter()
        .find_map(|k| find_keyword(normalized, k))
    {
        signals.push(KEYWORD_WEIGHT);
        span = Some(found);
    }

    if let Some(m) = value.regexes.iter().find_map(|re| re.find(normalized)) {
        signals.push(REGEX_WEIGHT);
        if span.is_none() {
            span = Some((char_offset(normalized, m.start()), char_offset(normalized, m.end())));
        }
    }

    let similarity = value
        .examples
        .iter()
        .map(|example| phrase_similarity(normalized, example))
        .fold(0.0f32, f32::max);
    if similarity >= SEMANTIC_FLOOR {
        signals.push(SEMANTIC_WEIGHT * similarity);
    }

    let strongest = signals.iter().copied().reduce(f32::max)?;
    let bonus = AGREEMENT_BONUS * (signals.len() - 1) as f32;
    Some(((strongest + bonus).min(1.0), span))
}
