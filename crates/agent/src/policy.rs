//! Slot Progression Policy
//!
//! Decides what the dialogue does after a turn's extraction has been
//! written into the session:
//!
//! - one pass of dependency rules keyed off the slots filled this turn
//! - clarification when a value was ambiguous or a case asked for it
//! - elicitation of the missing required slots in priority order
//! - a search once nothing required is missing
//!
//! Elicitation is bounded. The turn limit, the per-slot attempt limit and
//! a repeated identical query each force the dialogue to `Ready`, filling
//! what is still missing from suggestions or schema defaults.

use advisor_config::{
    CollectionMode, MissingSlotPolicy, ResponseDirective, SchemaConfig,
};
use advisor_core::{
    DependencyEffects, DialogueStage, ExtractionMethod, MatchResult, OfferedOptions,
    SearchRequest, SessionState, SlotOption,
};
use advisor_text_processing::PatternMatcher;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::extractor::ExtractionResult;
use crate::tracker::{apply_match, StateChange};

/// Confidence of values implied by dependency rules
pub const DEPENDENCY_CONFIDENCE: f32 = 0.7;
/// Confidence of values filled from suggestions or defaults
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

const DEFAULT_SEARCH_MESSAGE: &str = "好的，我這就開始搜尋。";

/// What the dialogue does next
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DialogueAction {
    /// Ask for one or more missing slots
    Elicit {
        slots: Vec<String>,
        question: String,
        options: Vec<SlotOption>,
    },
    /// Ask the user to pick between candidate values or rephrase
    Clarify {
        slot: Option<String>,
        question: String,
        options: Vec<SlotOption>,
    },
    /// Hand the collected profile to catalog search
    Search {
        request: SearchRequest,
        message: Option<String>,
    },
}

impl DialogueAction {
    /// Text to show the user
    pub fn response(&self) -> &str {
        match self {
            DialogueAction::Elicit { question, .. } | DialogueAction::Clarify { question, .. } => {
                question
            },
            DialogueAction::Search { message, .. } => {
                message.as_deref().unwrap_or(DEFAULT_SEARCH_MESSAGE)
            },
        }
    }

    pub fn search_request(&self) -> Option<&SearchRequest> {
        match self {
            DialogueAction::Search { request, .. } => Some(request),
            _ => None,
        }
    }

    pub fn is_search(&self) -> bool {
        self.search_request().is_some()
    }
}

/// Why readiness was forced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceReason {
    LoopBreaker,
    SpecialCase,
    MaxTurns,
    RepeatedQuery,
    MaxAttempts,
}

/// Result of one policy step
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub action: DialogueAction,
    pub stage: DialogueStage,
    /// Slot writes made by the policy (inferences, defaults)
    pub changes: Vec<StateChange>,
    pub forced: Option<ForceReason>,
}

/// Required slots that are still empty, in priority order
///
/// A slot is required when a dependency rule requires it, or when the
/// schema flags it and no rule made it optional.
pub fn missing_required(schema: &SchemaConfig, state: &SessionState) -> Vec<String> {
    schema
        .slots_by_priority()
        .into_iter()
        .filter(|(name, def)| {
            let name = *name;
            state.effects.required.contains(name)
                || (def.required && !state.effects.optional.contains(name))
        })
        .filter(|(name, _)| !state.has_slot(name))
        .map(|(name, _)| name.to_string())
        .collect()
}

pub struct DialoguePolicy {
    schema: Arc<SchemaConfig>,
    matcher: Arc<PatternMatcher>,
}

impl DialoguePolicy {
    pub fn new(matcher: Arc<PatternMatcher>) -> Self {
        Self {
            schema: Arc::clone(matcher.schema()),
            matcher,
        }
    }

    pub fn missing_required(&self, state: &SessionState) -> Vec<String> {
        missing_required(&self.schema, state)
    }

    /// Decide the next action and update the session accordingly
    ///
    /// `just_filled` lists the slots written this turn; `query_repeats` is
    /// how often the current query has been seen in this session.
    pub fn decide(
        &self,
        state: &mut SessionState,
        extraction: &ExtractionResult,
        just_filled: &[String],
        query_repeats: u32,
    ) -> PolicyDecision {
        let strategy = &self.schema.collection_strategy;
        let turn = state.user_turn_count();
        let directive = extraction.directive.clone().unwrap_or_default();
        let mut changes = Vec::new();
        let mut filled: Vec<String> = just_filled.to_vec();

        // Ambiguities asked about too often are settled on the top value
        let mut clarify: Option<&MatchResult> = None;
        let mut unsettled: Vec<&MatchResult> = Vec::new();
        for candidate in &extraction.ambiguities {
            if state.elicitation_count(&candidate.slot) >= strategy.max_attempts_per_slot {
                tracing::debug!(slot = %candidate.slot, value = %candidate.value, "Settling ambiguity on top value");
                changes.extend(apply_match(state, candidate, turn));
                filled.push(candidate.slot.clone());
            } else if clarify.is_none() {
                clarify = Some(candidate);
            } else {
                unsettled.push(candidate);
            }
        }

        changes.extend(self.apply_dependencies(state, &filled, turn));

        let missing = self.missing_required(state);
        let forced = if extraction.loop_breaker {
            Some(ForceReason::LoopBreaker)
        } else if directive.force_search {
            Some(ForceReason::SpecialCase)
        } else if turn >= strategy.max_turns as usize {
            Some(ForceReason::MaxTurns)
        } else if query_repeats > strategy.max_attempts_per_slot {
            Some(ForceReason::RepeatedQuery)
        } else if missing
            .first()
            .map_or(false, |slot| state.elicitation_count(slot) >= strategy.max_attempts_per_slot)
        {
            Some(ForceReason::MaxAttempts)
        } else {
            None
        };

        if let Some(reason) = forced {
            tracing::info!(session_id = %state.session_id, reason = ?reason, missing = missing.len(), "Forcing search");
            for candidate in clarify.into_iter().chain(unsettled) {
                changes.extend(apply_match(state, candidate, turn));
            }
            return self.finish(state, changes, Some(reason), &directive);
        }

        if let Some(candidate) = clarify {
            return self.clarify_ambiguity(state, candidate, changes);
        }

        if missing.is_empty() {
            return self.finish(state, changes, None, &directive);
        }

        if directive.clarify {
            return self.clarify_directive(state, &missing, changes, &directive);
        }

        self.elicit(state, &missing, changes, &directive)
    }

    /// Next action for the session as it stands, without changing it
    pub fn peek(&self, state: &SessionState) -> DialogueAction {
        if state.stage == DialogueStage::Clarifying {
            if let Some(offered) = &state.last_options {
                return DialogueAction::Clarify {
                    slot: Some(offered.slot.clone()),
                    question: self.clarify_question(&offered.options),
                    options: offered.options.clone(),
                };
            }
        }

        let missing = self.missing_required(state);
        if missing.is_empty() {
            return DialogueAction::Search {
                request: SearchRequest {
                    session_id: state.session_id.clone(),
                    slots: state.slot_map(),
                    defaulted: Vec::new(),
                    forced: false,
                },
                message: None,
            };
        }

        let targets = self.targets(&missing);
        let (question, options) = self.compose_question(state, &targets);
        DialogueAction::Elicit {
            slots: targets,
            question,
            options,
        }
    }

    /// Recompute dependency effects and apply `set` rules of the sources
    /// filled this turn
    ///
    /// Rules see the slots as they were before the pass, so one pass never
    /// chains. Values the user gave are never overwritten; when two rules
    /// set different values for the same slot the first source in name
    /// order wins. A slot both required and made optional stays required.
    pub fn apply_dependencies(
        &self,
        state: &mut SessionState,
        just_filled: &[String],
        turn: usize,
    ) -> Vec<StateChange> {
        let snapshot = state.slot_map();
        let mut effects = DependencyEffects::default();
        let mut implied: BTreeMap<String, (String, String)> = BTreeMap::new();

        for (source, value) in &snapshot {
            let Some(dependency) = self.schema.dependency_for(source) else {
                continue;
            };
            let fresh = just_filled.iter().any(|s| s == source);

            for rule in dependency.rules.iter().filter(|r| r.fires_on(value)) {
                if fresh {
                    for (target, target_value) in &rule.set {
                        if self.user_provided(state, target) {
                            continue;
                        }
                        match implied.get(target) {
                            Some((existing, first_source)) if existing != target_value => {
                                tracing::warn!(
                                    slot = %target,
                                    kept = %existing,
                                    kept_from = %first_source,
                                    dropped = %target_value,
                                    dropped_from = %source,
                                    "Conflicting dependency rules"
                                );
                            },
                            Some(_) => {},
                            None => {
                                implied.insert(target.clone(), (target_value.clone(), source.clone()));
                            },
                        }
                    }
                }

                for (target, suggestion) in &rule.suggest {
                    effects
                        .suggested
                        .entry(target.clone())
                        .or_insert_with(|| suggestion.clone());
                }
                for (target, values) in &rule.narrow {
                    match effects.narrowed.get_mut(target) {
                        Some(existing) => existing.retain(|v| values.contains(v)),
                        None => {
                            effects.narrowed.insert(target.clone(), values.clone());
                        },
                    }
                }
                effects.required.extend(rule.require.iter().cloned());
                effects.optional.extend(rule.make_optional.iter().cloned());
            }
        }

        let required = effects.required.clone();
        effects.optional.retain(|slot| !required.contains(slot));
        if effects != state.effects {
            tracing::debug!(
                required = ?effects.required,
                optional = ?effects.optional,
                narrowed = effects.narrowed.len(),
                suggested = effects.suggested.len(),
                "Dependency effects updated"
            );
        }
        state.effects = effects;

        let mut changes = Vec::new();
        for (target, (value, source)) in implied {
            if !self.matcher.is_allowed(&target, &value) {
                tracing::warn!(slot = %target, value = %value, source = %source, "Implied value not allowed");
                continue;
            }
            let inferred = MatchResult::new(target, value, DEPENDENCY_CONFIDENCE, ExtractionMethod::DependencyInference);
            changes.extend(apply_match(state, &inferred, turn));
        }
        changes
    }

    fn user_provided(&self, state: &SessionState, slot: &str) -> bool {
        state.get_slot(slot).map_or(false, |filled| {
            !matches!(
                filled.method,
                ExtractionMethod::DependencyInference | ExtractionMethod::DefaultValue
            )
        })
    }

    fn targets(&self, missing: &[String]) -> Vec<String> {
        let batch = match self.schema.collection_strategy.mode {
            CollectionMode::Priority => 1,
            CollectionMode::Batch => self.schema.collection_strategy.batch_size.max(1),
        };
        missing.iter().take(batch).cloned().collect()
    }

    /// Allowed values of a slot after narrowing
    fn allowed_options(&self, state: &SessionState, slot: &str) -> Vec<SlotOption> {
        let options = self.matcher.options(slot);
        match state.effects.narrowed.get(slot).filter(|n| !n.is_empty()) {
            Some(narrowed) => options
                .into_iter()
                .filter(|o| narrowed.iter().any(|n| n.eq_ignore_ascii_case(&o.id)))
                .collect(),
            None => options,
        }
    }

    fn compose_question(&self, state: &SessionState, targets: &[String]) -> (String, Vec<SlotOption>) {
        let fallback = &self.schema.fallback_strategy;
        let prompts: Vec<String> = targets
            .iter()
            .map(|slot| {
                self.schema
                    .get_slot(slot)
                    .and_then(|def| def.prompt.clone())
                    .unwrap_or_else(|| fallback.generic_question.clone())
            })
            .collect();
        let mut question = prompts.join(" ");

        let mut options = Vec::new();
        if let [slot] = targets {
            if self.schema.get_slot(slot).map_or(false, |def| def.options_in_prompt) {
                options = self.allowed_options(state, slot);
                if !options.is_empty() {
                    question.push_str(&format!("（{}）", numbered(&options)));
                }
            }
        }
        (question, options)
    }

    fn clarify_question(&self, options: &[SlotOption]) -> String {
        self.schema
            .fallback_strategy
            .clarify_template
            .replace("{options}", &numbered(options))
    }

    fn elicit(
        &self,
        state: &mut SessionState,
        missing: &[String],
        changes: Vec<StateChange>,
        directive: &ResponseDirective,
    ) -> PolicyDecision {
        let targets = self.targets(missing);

        // A case reply stands in for the question; the attempt is not counted
        let (question, options) = match (&directive.response, directive.skip_next_question) {
            (Some(response), true) => (response.clone(), Vec::new()),
            _ => {
                let (question, options) = self.compose_question(state, &targets);
                for slot in &targets {
                    let attempt = state.note_elicitation(slot);
                    tracing::debug!(slot = %slot, attempt, "Eliciting slot");
                }
                let question = match &directive.response {
                    Some(response) => format!("{}{}", response, question),
                    None => question,
                };
                (question, options)
            },
        };

        state.last_options = match targets.as_slice() {
            [slot] if !options.is_empty() => Some(OfferedOptions {
                slot: slot.clone(),
                options: options.clone(),
            }),
            _ => None,
        };
        state.pending_slots = targets.clone();
        transition(state, DialogueStage::Collecting);

        PolicyDecision {
            action: DialogueAction::Elicit {
                slots: targets,
                question,
                options,
            },
            stage: state.stage,
            changes,
            forced: None,
        }
    }

    fn clarify_ambiguity(
        &self,
        state: &mut SessionState,
        candidate: &MatchResult,
        changes: Vec<StateChange>,
    ) -> PolicyDecision {
        let known = self.matcher.options(&candidate.slot);
        let label = |id: &str| {
            known
                .iter()
                .find(|o| o.id.eq_ignore_ascii_case(id))
                .map(|o| o.label.clone())
                .unwrap_or_else(|| id.to_string())
        };
        let options: Vec<SlotOption> = std::iter::once(candidate.value.as_str())
            .chain(candidate.alternatives.iter().map(|(id, _)| id.as_str()))
            .map(|id| SlotOption {
                id: id.to_string(),
                label: label(id),
            })
            .collect();

        let attempt = state.note_elicitation(&candidate.slot);
        tracing::debug!(slot = %candidate.slot, candidates = options.len(), attempt, "Clarifying ambiguous value");

        state.last_options = Some(OfferedOptions {
            slot: candidate.slot.clone(),
            options: options.clone(),
        });
        state.pending_slots = vec![candidate.slot.clone()];
        transition(state, DialogueStage::Clarifying);

        PolicyDecision {
            action: DialogueAction::Clarify {
                slot: Some(candidate.slot.clone()),
                question: self.clarify_question(&options),
                options,
            },
            stage: state.stage,
            changes,
            forced: None,
        }
    }

    fn clarify_directive(
        &self,
        state: &mut SessionState,
        missing: &[String],
        changes: Vec<StateChange>,
        directive: &ResponseDirective,
    ) -> PolicyDecision {
        let slot = missing.first().cloned();
        let options = slot
            .as_deref()
            .map(|s| self.allowed_options(state, s))
            .unwrap_or_default();

        let mut question = directive
            .response
            .clone()
            .unwrap_or_else(|| self.schema.fallback_strategy.generic_question.clone());
        if !options.is_empty() {
            question.push_str(&format!("（{}）", numbered(&options)));
        }

        if let Some(slot) = &slot {
            state.note_elicitation(slot);
            state.pending_slots = vec![slot.clone()];
        }
        state.last_options = slot
            .clone()
            .filter(|_| !options.is_empty())
            .map(|slot| OfferedOptions {
                slot,
                options: options.clone(),
            });
        transition(state, DialogueStage::Clarifying);

        PolicyDecision {
            action: DialogueAction::Clarify {
                slot,
                question,
                options,
            },
            stage: state.stage,
            changes,
            forced: None,
        }
    }

    fn finish(
        &self,
        state: &mut SessionState,
        mut changes: Vec<StateChange>,
        forced: Option<ForceReason>,
        directive: &ResponseDirective,
    ) -> PolicyDecision {
        let fallback = &self.schema.fallback_strategy;
        let turn = state.user_turn_count();
        let missing = self.missing_required(state);
        let mut defaulted = Vec::new();

        for slot in &missing {
            let default = state
                .effects
                .suggested
                .get(slot)
                .cloned()
                .or_else(|| self.schema.get_slot(slot).and_then(|def| def.default.clone()))
                .filter(|_| fallback.use_defaults);
            match default {
                Some(value) if self.matcher.is_allowed(slot, &value) => {
                    let result = MatchResult::new(slot, value, DEFAULT_CONFIDENCE, ExtractionMethod::DefaultValue);
                    changes.extend(apply_match(state, &result, turn));
                    defaulted.push(slot.clone());
                },
                _ => tracing::debug!(slot = %slot, "Missing slot has no usable default"),
            }
        }

        let mut slots = state.slot_map();
        if fallback.missing_slot_policy == MissingSlotPolicy::KeepEmpty {
            for slot in missing.iter().filter(|s| !defaulted.contains(s)) {
                slots.insert(slot.clone(), String::new());
            }
        }

        let request = SearchRequest {
            session_id: state.session_id.clone(),
            slots,
            defaulted,
            forced: forced.is_some(),
        };

        let confirmation = self
            .schema
            .collection_strategy
            .require_confirmation
            .then(|| fallback.confirmation_template.replace("{summary}", &self.summary(state)));
        let message = match (directive.response.clone(), confirmation) {
            (Some(response), Some(confirmation)) => Some(format!("{}{}", response, confirmation)),
            (response, confirmation) => response.or(confirmation),
        };

        state.last_options = None;
        state.pending_slots.clear();
        transition(state, DialogueStage::Ready);

        PolicyDecision {
            action: DialogueAction::Search { request, message },
            stage: state.stage,
            changes,
            forced,
        }
    }

    /// Display labels of the filled slots in fill order
    fn summary(&self, state: &SessionState) -> String {
        state
            .filled_slots()
            .iter()
            .map(|filled| match self.schema.get_slot(&filled.slot) {
                Some(def) => def.display_for(&filled.value).to_string(),
                None => filled.value.clone(),
            })
            .collect::<Vec<_>>()
            .join("、")
    }
}

fn numbered(options: &[SlotOption]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}. {}", i + 1, o.label))
        .collect::<Vec<_>>()
        .join(" / ")
}

/// Move to `target` along legal transitions only
fn transition(state: &mut SessionState, target: DialogueStage) {
    let Some(route) = state.stage.route_to(target) else {
        tracing::warn!(session_id = %state.session_id, from = %state.stage, to = %target, "No route between stages");
        return;
    };
    for step in route {
        debug_assert!(state.stage.can_transition_to(step));
        tracing::info!(session_id = %state.session_id, from = %state.stage, to = %step, "Stage transition");
        state.stage = step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::matcher;
    use advisor_core::{FilledSlot, Turn};

    fn policy() -> DialoguePolicy {
        DialoguePolicy::new(matcher())
    }

    fn user_turn(state: &mut SessionState, text: &str) {
        state.push_turn(Turn::user(text));
    }

    fn fill(state: &mut SessionState, slot: &str, value: &str) {
        state.fill_slot(FilledSlot::from_match(
            &MatchResult::new(slot, value, 0.9, ExtractionMethod::PatternMatch),
            1,
        ));
    }

    #[test]
    fn test_elicits_highest_priority_missing_slot() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        user_turn(&mut state, "你好");

        let decision = policy.decide(&mut state, &ExtractionResult::default(), &[], 1);
        match &decision.action {
            DialogueAction::Elicit { slots, options, question } => {
                assert_eq!(slots, &vec!["usage_purpose".to_string()]);
                assert_eq!(options.len(), 3);
                assert!(question.contains("1. 遊戲"));
            },
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(state.elicitation_count("usage_purpose"), 1);
        assert_eq!(state.last_options.as_ref().unwrap().slot, "usage_purpose");
        assert_eq!(decision.stage, DialogueStage::Collecting);
    }

    #[test]
    fn test_ready_when_required_filled() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        user_turn(&mut state, "遊戲 3-4萬");
        fill(&mut state, "usage_purpose", "office");
        fill(&mut state, "budget_range", "30k_40k");

        let just = vec!["usage_purpose".to_string(), "budget_range".to_string()];
        let decision = policy.decide(&mut state, &ExtractionResult::default(), &just, 1);
        let request = decision.action.search_request().unwrap();
        assert_eq!(request.slots["budget_range"], "30k_40k");
        assert!(!request.forced);
        assert_eq!(state.stage, DialogueStage::Ready);
        assert!(decision.forced.is_none());
    }

    #[test]
    fn test_dependency_require_and_set() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        user_turn(&mut state, "遊戲");
        fill(&mut state, "usage_purpose", "gaming");

        let changes = policy.apply_dependencies(&mut state, &["usage_purpose".to_string()], 1);
        assert!(state.effects.required.contains("gpu_level"));
        assert_eq!(state.effects.suggested["budget_range"], "30k_40k");
        assert_eq!(state.effects.narrowed["budget_range"], vec!["30k_40k", "over_40k"]);
        assert_eq!(changes.len(), 1);
        assert_eq!(state.slot_value("portability"), Some("standard"));
        assert_eq!(state.get_slot("portability").unwrap().method, ExtractionMethod::DependencyInference);
    }

    #[test]
    fn test_dependency_never_overwrites_user_value() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        fill(&mut state, "portability", "light");
        fill(&mut state, "usage_purpose", "gaming");

        let changes = policy.apply_dependencies(&mut state, &["usage_purpose".to_string()], 1);
        assert!(changes.is_empty());
        assert_eq!(state.slot_value("portability"), Some("light"));
    }

    #[test]
    fn test_require_beats_optional() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        fill(&mut state, "usage_purpose", "gaming");
        fill(&mut state, "portability", "light");
        policy.apply_dependencies(&mut state, &[], 1);

        // gaming requires gpu_level, light makes it optional
        assert!(state.effects.required.contains("gpu_level"));
        assert!(!state.effects.optional.contains("gpu_level"));
        assert!(policy.missing_required(&state).contains(&"gpu_level".to_string()));
    }

    #[test]
    fn test_effects_follow_current_values() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        fill(&mut state, "usage_purpose", "gaming");
        policy.apply_dependencies(&mut state, &["usage_purpose".to_string()], 1);
        assert!(state.effects.required.contains("gpu_level"));

        fill(&mut state, "usage_purpose", "office");
        policy.apply_dependencies(&mut state, &["usage_purpose".to_string()], 2);
        assert!(!state.effects.required.contains("gpu_level"));
    }

    #[test]
    fn test_attempt_limit_forces_ready_with_defaults() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        for turn in 1..=3 {
            user_turn(&mut state, &format!("嗯{}", turn));
            let decision = policy.decide(&mut state, &ExtractionResult::default(), &[], 1);
            if turn < 3 {
                assert!(!decision.action.is_search());
            } else {
                assert_eq!(decision.forced, Some(ForceReason::MaxAttempts));
                let request = decision.action.search_request().unwrap();
                assert!(request.forced);
                assert_eq!(request.slots["usage_purpose"], "office");
                assert!(request.defaulted.contains(&"usage_purpose".to_string()));
                // budget has no default and is dropped
                assert!(!request.slots.contains_key("budget_range"));
            }
        }
        assert_eq!(state.stage, DialogueStage::Ready);
    }

    #[test]
    fn test_repeated_query_forces_ready() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        user_turn(&mut state, "嗯");
        let decision = policy.decide(&mut state, &ExtractionResult::default(), &[], 3);
        assert_eq!(decision.forced, Some(ForceReason::RepeatedQuery));
    }

    #[test]
    fn test_ambiguity_clarified_then_settled() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        let ambiguous = MatchResult::new("usage_purpose", "gaming", 0.95, ExtractionMethod::PatternMatch)
            .with_alternatives(vec![("office".to_string(), 0.95)]);
        let extraction = ExtractionResult {
            ambiguities: vec![ambiguous],
            ..Default::default()
        };

        user_turn(&mut state, "遊戲跟文書");
        let decision = policy.decide(&mut state, &extraction, &[], 1);
        match &decision.action {
            DialogueAction::Clarify { options, question, .. } => {
                assert_eq!(options.len(), 2);
                assert!(question.contains("文書處理"));
            },
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(state.stage, DialogueStage::Clarifying);

        user_turn(&mut state, "遊戲跟文書 都要");
        policy.decide(&mut state, &extraction, &[], 1);
        user_turn(&mut state, "都要啦");
        policy.decide(&mut state, &extraction, &[], 1);
        assert_eq!(state.slot_value("usage_purpose"), Some("gaming"));
    }

    #[test]
    fn test_ambiguity_after_ready_goes_through_collecting() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        state.stage = DialogueStage::Ready;
        fill(&mut state, "budget_range", "30k_40k");
        let extraction = ExtractionResult {
            ambiguities: vec![MatchResult::new("usage_purpose", "gaming", 0.95, ExtractionMethod::PatternMatch)
                .with_alternatives(vec![("office".to_string(), 0.95)])],
            ..Default::default()
        };

        user_turn(&mut state, "遊戲跟文書");
        let decision = policy.decide(&mut state, &extraction, &[], 1);
        assert!(matches!(decision.action, DialogueAction::Clarify { .. }));
        assert_eq!(decision.stage, DialogueStage::Clarifying);
    }

    #[test]
    fn test_missing_slot_after_ready_returns_to_collecting() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        state.stage = DialogueStage::Ready;
        fill(&mut state, "usage_purpose", "gaming");

        user_turn(&mut state, "預算再想想");
        let decision = policy.decide(&mut state, &ExtractionResult::default(), &[], 1);
        assert!(matches!(decision.action, DialogueAction::Elicit { .. }));
        assert_eq!(state.stage, DialogueStage::Collecting);
    }

    #[test]
    fn test_force_search_directive() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        user_turn(&mut state, "隨便推薦");
        let extraction = ExtractionResult {
            directive: Some(ResponseDirective {
                response: Some("好的".to_string()),
                force_search: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let decision = policy.decide(&mut state, &extraction, &[], 1);
        assert_eq!(decision.forced, Some(ForceReason::SpecialCase));
        assert_eq!(decision.action.response(), "好的");
    }

    #[test]
    fn test_skip_next_question_uses_case_reply() {
        let policy = policy();
        let mut state = SessionState::new("s1");
        user_turn(&mut state, "我是學生");
        let extraction = ExtractionResult {
            directive: Some(ResponseDirective {
                response: Some("了解！".to_string()),
                skip_next_question: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let decision = policy.decide(&mut state, &extraction, &[], 1);
        assert_eq!(decision.action.response(), "了解！");
        assert_eq!(state.elicitation_count("usage_purpose"), 0);
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let policy = policy();
        let state = SessionState::new("s1");
        let action = policy.peek(&state);
        assert!(matches!(action, DialogueAction::Elicit { .. }));
        assert_eq!(state.elicitation_count("usage_purpose"), 0);
        assert!(state.last_options.is_none());
    }
}
