//! Multi-Strategy Slot Extraction
//!
//! Strategies run in a fixed order:
//!
//! 1. [`OptionSelectionStrategy`]: reply to the options offered last turn
//! 2. [`SpecialCaseStrategy`]: pre-authored cases and loop breaking
//! 3. [`PatternStrategy`]: schema keywords, regexes, examples, learning
//! 4. [`ClassificationStrategy`]: external classifier for what is left
//!
//! A strategy whose best match reaches the short-circuit confidence stops
//! the run. Candidates are merged per slot, keeping the highest confidence
//! (ties go to the earlier strategy), and checked against the allowed
//! values before the merge. A slot that already holds a value is only
//! overwritten when the new confidence beats the stored one by more than
//! the schema's overwrite margin. An utterance carrying a correction
//! marker ("不對", "其實") only has to match the stored confidence.

mod classification;
mod option_selection;
mod pattern;
mod special_case;

pub use classification::ClassificationStrategy;
pub use option_selection::OptionSelectionStrategy;
pub use pattern::PatternStrategy;
pub use special_case::SpecialCaseStrategy;

use advisor_config::{ExtractorSettings, ResponseDirective, SchemaConfig};
use advisor_core::{
    insert_best, ExtractionMethod, FilledSlot, MatchResult, OfferedOptions, SessionState,
    SlotClassifier,
};
use advisor_text_processing::PatternMatcher;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::policy::missing_required;
use crate::special_cases::{CaseMatch, SpecialCaseKnowledgeBase};

/// Everything a strategy may look at for one utterance
#[derive(Debug, Clone)]
pub struct ExtractionContext<'a> {
    pub text: &'a str,
    pub session_id: &'a str,
    pub current_slots: &'a HashMap<String, FilledSlot>,
    /// Options offered by the previous question
    pub last_options: Option<&'a OfferedOptions>,
    /// Slots the previous question asked for
    pub pending_slots: &'a [String],
    /// Required slots still empty, in priority order
    pub unresolved_required: Vec<String>,
}

/// Candidates produced by one strategy
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub matches: Vec<MatchResult>,
    pub case: Option<CaseMatch>,
}

impl StrategyOutput {
    pub fn from_matches(matches: Vec<MatchResult>) -> Self {
        Self {
            matches,
            case: None,
        }
    }

    pub fn best_confidence(&self) -> f32 {
        self.matches
            .iter()
            .map(|m| m.confidence)
            .fold(0.0f32, f32::max)
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.case.is_none()
    }
}

/// One way of turning an utterance into slot candidates
///
/// Strategies never fail: a strategy that cannot contribute returns an
/// empty output.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn method(&self) -> ExtractionMethod;

    /// `resolved` holds the candidates merged from earlier strategies
    async fn extract(
        &self,
        ctx: &ExtractionContext<'_>,
        resolved: &HashMap<String, MatchResult>,
    ) -> StrategyOutput;
}

/// Outcome of extracting one utterance
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionResult {
    /// Method behind the strongest accepted value
    pub extraction_method: Option<ExtractionMethod>,
    /// Values to write into the session
    pub extracted_slots: BTreeMap<String, MatchResult>,
    pub confidence: f32,
    pub success: bool,
    pub directive: Option<ResponseDirective>,
    pub case_id: Option<String>,
    pub loop_breaker: bool,
    /// Matches held back because other values scored within the margin
    pub ambiguities: Vec<MatchResult>,
    /// Matches that did not beat the stored value by the overwrite margin
    pub rejected: Vec<MatchResult>,
    pub strategies_run: Vec<&'static str>,
}

impl ExtractionResult {
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguities.is_empty()
    }

    pub fn slot(&self, slot: &str) -> Option<&MatchResult> {
        self.extracted_slots.get(slot)
    }
}

/// Ordered strategy runner with confidence arbitration
pub struct MultiStrategyExtractor {
    schema: Arc<SchemaConfig>,
    matcher: Arc<PatternMatcher>,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    short_circuit_confidence: f32,
}

impl MultiStrategyExtractor {
    /// Extractor without strategies
    pub fn new(matcher: Arc<PatternMatcher>, settings: &ExtractorSettings) -> Self {
        Self {
            schema: Arc::clone(matcher.schema()),
            matcher,
            strategies: Vec::new(),
            short_circuit_confidence: settings.short_circuit_confidence,
        }
    }

    /// The standard pipeline; the classifier step is skipped when none is given
    pub fn standard(
        matcher: Arc<PatternMatcher>,
        kb: Arc<SpecialCaseKnowledgeBase>,
        classifier: Option<Arc<dyn SlotClassifier>>,
        settings: &ExtractorSettings,
        enable_learning: bool,
    ) -> Self {
        let mut extractor = Self::new(Arc::clone(&matcher), settings)
            .with_strategy(Box::new(OptionSelectionStrategy::new()))
            .with_strategy(Box::new(SpecialCaseStrategy::new(kb)))
            .with_strategy(Box::new(PatternStrategy::new(Arc::clone(&matcher), enable_learning)));

        if let Some(classifier) = classifier.filter(|_| settings.classifier_enabled) {
            extractor = extractor.with_strategy(Box::new(ClassificationStrategy::new(
                classifier,
                matcher,
                settings.classifier_weight,
            )));
        }
        extractor
    }

    /// Append a strategy; strategies run in insertion order
    pub fn with_strategy(mut self, strategy: Box<dyn ExtractionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Extract slots from an utterance given the slots filled so far
    pub async fn extract(
        &self,
        text: &str,
        current_slots: &HashMap<String, FilledSlot>,
        session_id: &str,
    ) -> ExtractionResult {
        let ctx = ExtractionContext {
            text,
            session_id,
            current_slots,
            last_options: None,
            pending_slots: &[],
            unresolved_required: self
                .schema
                .required_slots()
                .into_iter()
                .filter(|slot| !current_slots.contains_key(*slot))
                .map(str::to_string)
                .collect(),
        };
        self.run(&ctx).await
    }

    /// Extract with the full session context (offered options, pending
    /// question, dependency effects)
    pub async fn extract_for_session(&self, text: &str, state: &SessionState) -> ExtractionResult {
        let current_slots = state.slot_records();
        let ctx = ExtractionContext {
            text,
            session_id: &state.session_id,
            current_slots: &current_slots,
            last_options: state.last_options.as_ref(),
            pending_slots: &state.pending_slots,
            unresolved_required: missing_required(&self.schema, state),
        };
        self.run(&ctx).await
    }

    async fn run(&self, ctx: &ExtractionContext<'_>) -> ExtractionResult {
        if ctx.text.trim().is_empty() {
            return ExtractionResult::default();
        }

        let mut merged: HashMap<String, MatchResult> = HashMap::new();
        let mut case: Option<CaseMatch> = None;
        let mut strategies_run = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let output = strategy.extract(ctx, &merged).await;
            strategies_run.push(strategy.name());
            let best = output.best_confidence();

            if case.is_none() {
                case = output.case;
            }
            for candidate in output.matches {
                if !self.matcher.is_allowed(&candidate.slot, &candidate.value) {
                    tracing::debug!(
                        strategy = strategy.name(),
                        slot = %candidate.slot,
                        value = %candidate.value,
                        "Dropping value outside the allowed set"
                    );
                    continue;
                }
                insert_best(&mut merged, candidate);
            }

            if best >= self.short_circuit_confidence {
                tracing::debug!(
                    strategy = strategy.name(),
                    method = %strategy.method(),
                    confidence = best,
                    "Short-circuiting extraction"
                );
                break;
            }
        }

        let result = self.arbitrate(ctx, merged, case, strategies_run);
        tracing::debug!(
            session_id = ctx.session_id,
            method = ?result.extraction_method,
            slots = result.extracted_slots.len(),
            ambiguities = result.ambiguities.len(),
            rejected = result.rejected.len(),
            confidence = result.confidence,
            "Extraction complete"
        );
        result
    }

    fn arbitrate(
        &self,
        ctx: &ExtractionContext<'_>,
        merged: HashMap<String, MatchResult>,
        case: Option<CaseMatch>,
        strategies_run: Vec<&'static str>,
    ) -> ExtractionResult {
        let rules = &self.schema.validation_rules;
        let margin = if rules.is_correction(ctx.text) {
            0.0
        } else {
            rules.overwrite_margin
        };
        let mut result = ExtractionResult {
            strategies_run,
            ..Default::default()
        };

        let mut candidates: Vec<MatchResult> = merged.into_values().collect();
        candidates.sort_by(|a, b| a.slot.cmp(&b.slot));

        for candidate in candidates {
            match ctx.current_slots.get(&candidate.slot) {
                Some(existing) if existing.value == candidate.value => continue,
                Some(existing) if !beats_stored(candidate.confidence, existing.confidence, margin) => {
                    tracing::debug!(
                        slot = %candidate.slot,
                        stored = %existing.value,
                        offered = %candidate.value,
                        "Keeping stored value"
                    );
                    result.rejected.push(candidate);
                },
                _ if candidate.is_ambiguous() => result.ambiguities.push(candidate),
                _ => {
                    result.extracted_slots.insert(candidate.slot.clone(), candidate);
                },
            }
        }

        let strongest = result
            .extracted_slots
            .values()
            .fold(None::<&MatchResult>, |best, m| match best {
                Some(b) if !m.outranks(b) => Some(b),
                _ => Some(m),
            });
        result.extraction_method = strongest.map(|m| m.method);
        result.confidence = strongest.map(|m| m.confidence).unwrap_or(0.0);

        if let Some(case) = case {
            if result.extraction_method.is_none() {
                result.extraction_method = Some(ExtractionMethod::SpecialCaseKnowledge);
                result.confidence = case.similarity;
            }
            result.directive = Some(case.directive);
            result.case_id = Some(case.case_id);
            result.loop_breaker = case.loop_breaker;
        }

        result.success = !result.extracted_slots.is_empty() || result.directive.is_some();
        result
    }
}

/// Strictly above `stored + margin`; with no margin a tie is enough
fn beats_stored(offered: f32, stored: f32, margin: f32) -> bool {
    if margin > 0.0 {
        offered > stored + margin
    } else {
        offered >= stored
    }
}
