//! Special-Case Knowledge Base
//!
//! Matches utterances against pre-authored cases ("just recommend
//! something", "I don't know") and keeps the dialogue out of loops.
//!
//! ## Loop detection
//!
//! Each session keeps a rolling window of the last few canonical-query
//! hashes together with the case each one matched. When the same query
//! has matched the same case `repeat_threshold` times in a row without
//! the dialogue stage changing, every further identical query returns the
//! loop breaker instead of the case.
//!
//! The knowledge base is shared between sessions and owns its locking:
//! per-session loop state lives in a `DashMap`, case statistics behind a
//! `parking_lot::RwLock`.

use advisor_config::{ResponseDirective, SpecialCaseDefinition, SpecialCasesConfig};
use advisor_core::DialogueStage;
use advisor_text_processing::{bigram_dice, canonical_query, query_hash};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Similarity when one phrasing fully contains the other
const CONTAINMENT_SCORE: f32 = 0.95;

/// Similarities closer than this are tied
const TIE_EPSILON: f32 = 1e-6;

/// A case selected for a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseMatch {
    pub case_id: String,
    pub similarity: f32,
    pub inferred_slots: BTreeMap<String, String>,
    pub directive: ResponseDirective,
    /// Returned instead of a repeating case
    pub loop_breaker: bool,
}

/// Hit and success counters for one case
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CaseStats {
    pub hits: u64,
    pub successes: u64,
}

impl CaseStats {
    pub fn success_rate(&self) -> f32 {
        if self.hits == 0 {
            0.0
        } else {
            self.successes as f32 / self.hits as f32
        }
    }
}

#[derive(Debug, Default)]
struct LoopState {
    /// (query hash, matched case) for the most recent queries
    recent: VecDeque<(u64, Option<String>)>,
    stage: Option<DialogueStage>,
}

impl LoopState {
    fn push(&mut self, hash: u64, case_id: Option<String>, window: usize) {
        self.recent.push_back((hash, case_id));
        while self.recent.len() > window {
            self.recent.pop_front();
        }
    }

    /// Trailing run of identical (hash, case) entries
    fn streak(&self, hash: u64, case_id: &str) -> u32 {
        self.recent
            .iter()
            .rev()
            .take_while(|(h, c)| *h == hash && c.as_deref() == Some(case_id))
            .count() as u32
    }
}

struct CaseEntry {
    definition: SpecialCaseDefinition,
    /// Canonical forms of the example phrasings
    examples: Vec<String>,
}

/// Pre-authored case lookup with loop avoidance
pub struct SpecialCaseKnowledgeBase {
    cases: Vec<CaseEntry>,
    loop_breaker: SpecialCaseDefinition,
    repeat_threshold: u32,
    history_window: usize,
    sessions: DashMap<String, LoopState>,
    stats: RwLock<HashMap<String, CaseStats>>,
}

impl SpecialCaseKnowledgeBase {
    pub fn new(config: &SpecialCasesConfig) -> Self {
        let cases = config
            .cases
            .iter()
            .map(|definition| CaseEntry {
                examples: definition
                    .examples
                    .iter()
                    .map(|e| canonical_query(e))
                    .filter(|e| !e.is_empty())
                    .collect(),
                definition: definition.clone(),
            })
            .collect();

        Self {
            cases,
            loop_breaker: config.loop_breaker_case(),
            repeat_threshold: config.repeat_threshold.max(1),
            history_window: config.history_window.max(1),
            sessions: DashMap::new(),
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// Knowledge base without cases; only the loop breaker exists
    pub fn empty() -> Self {
        Self::new(&SpecialCasesConfig::default())
    }

    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// Best case for a query, or the loop breaker when the query repeats
    pub fn find_matching_case(&self, query: &str, session_id: &str) -> Option<CaseMatch> {
        let canonical = canonical_query(query);
        if canonical.is_empty() {
            return None;
        }
        let hash = query_hash(query);

        let Some((entry, similarity)) = self.best_case(&canonical) else {
            self.sessions
                .entry(session_id.to_string())
                .or_default()
                .push(hash, None, self.history_window);
            return None;
        };
        let case_id = entry.definition.id.clone();

        let streak = {
            let mut state = self.sessions.entry(session_id.to_string()).or_default();
            state.push(hash, Some(case_id.clone()), self.history_window);
            state.streak(hash, &case_id)
        };

        if streak > self.repeat_threshold {
            tracing::info!(
                session_id,
                case_id = %case_id,
                streak,
                "Repeated special case, breaking the loop"
            );
            self.record_hit(&self.loop_breaker.id);
            return Some(CaseMatch {
                case_id: self.loop_breaker.id.clone(),
                similarity: 1.0,
                inferred_slots: self.loop_breaker.inferred_slots.clone(),
                directive: self.loop_breaker.directive.clone(),
                loop_breaker: true,
            });
        }

        tracing::debug!(session_id, case_id = %case_id, similarity, streak, "Special case matched");
        self.record_hit(&case_id);
        Some(CaseMatch {
            case_id,
            similarity,
            inferred_slots: entry.definition.inferred_slots.clone(),
            directive: entry.definition.directive.clone(),
            loop_breaker: false,
        })
    }

    fn best_case(&self, canonical: &str) -> Option<(&CaseEntry, f32)> {
        let stats = self.stats.read();
        let rate = |id: &str| stats.get(id).map(CaseStats::success_rate).unwrap_or(0.0);

        let mut best: Option<(&CaseEntry, f32)> = None;
        for entry in &self.cases {
            let similarity = entry
                .examples
                .iter()
                .map(|example| case_similarity(canonical, example))
                .fold(0.0f32, f32::max);
            if similarity < entry.definition.threshold {
                continue;
            }

            best = match best {
                None => Some((entry, similarity)),
                Some((current, score)) => {
                    let tied = (similarity - score).abs() <= TIE_EPSILON;
                    if similarity > score + TIE_EPSILON
                        || (tied && rate(&entry.definition.id) > rate(&current.definition.id))
                    {
                        Some((entry, similarity))
                    } else {
                        Some((current, score))
                    }
                },
            };
        }
        best
    }

    /// Tell the knowledge base the session's stage after a turn; a stage
    /// change resets loop tracking
    pub fn observe_stage(&self, session_id: &str, stage: DialogueStage) {
        let mut state = self.sessions.entry(session_id.to_string()).or_default();
        if state.stage.map_or(false, |previous| previous != stage) {
            tracing::debug!(session_id, stage = %stage, "Stage changed, loop tracking reset");
            state.recent.clear();
        }
        state.stage = Some(stage);
    }

    /// Mark a case as having moved the dialogue forward
    pub fn record_success(&self, case_id: &str) {
        let mut stats = self.stats.write();
        let entry = stats.entry(case_id.to_string()).or_default();
        entry.successes = (entry.successes + 1).min(entry.hits.max(1));
    }

    fn record_hit(&self, case_id: &str) {
        self.stats.write().entry(case_id.to_string()).or_default().hits += 1;
    }

    pub fn stats(&self, case_id: &str) -> Option<CaseStats> {
        self.stats.read().get(case_id).copied()
    }

    pub fn all_stats(&self) -> HashMap<String, CaseStats> {
        self.stats.read().clone()
    }

    /// Forget a session's loop state
    pub fn clear_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Containment of the whole example scores high; otherwise bigram overlap
fn case_similarity(query: &str, example: &str) -> f32 {
    let query_len = query.chars().count();
    let example_len = example.chars().count();
    let containment = if query.contains(example) {
        CONTAINMENT_SCORE
    } else if example.contains(query) {
        CONTAINMENT_SCORE * query_len as f32 / example_len as f32
    } else {
        0.0
    };
    containment.max(bigram_dice(query, example))
}
