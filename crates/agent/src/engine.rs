//! Dialogue Engine
//!
//! Runs one user turn end to end:
//!
//! ```text
//! load session ─► extract ─► write slots ─► policy ─► catalog (if ready) ─► save
//! ```
//!
//! Empty input is answered with the pending question and leaves the
//! session untouched. Catalog failures are logged and never fail the turn;
//! session store failures are returned to the caller.

use advisor_config::{Settings, SchemaConfig, SpecialCasesConfig};
use advisor_core::{
    CatalogSearch, DialogueStage, LearnedPatternStore, SessionState, SessionStore, SlotClassifier,
    Turn,
};
use advisor_text_processing::{JsonFilePatternStore, PatternMatcher};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::extractor::{ExtractionResult, MultiStrategyExtractor};
use crate::policy::{DialogueAction, DialoguePolicy, ForceReason};
use crate::session_store::InMemorySessionStore;
use crate::special_cases::SpecialCaseKnowledgeBase;
use crate::tracker::{apply_match, StateChange};
use crate::{AgentError, Result};

/// Result of one turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    /// Whether the turn was processed (false for empty input)
    pub success: bool,
    pub action: DialogueAction,
    pub stage: DialogueStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionResult>,
    /// Slot writes made this turn, extraction and policy together
    pub changes: Vec<StateChange>,
    pub slots: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced: Option<ForceReason>,
    /// Text to show the user
    pub response: String,
}

pub struct DialogueEngine {
    matcher: Arc<PatternMatcher>,
    extractor: MultiStrategyExtractor,
    policy: DialoguePolicy,
    kb: Arc<SpecialCaseKnowledgeBase>,
    sessions: Arc<dyn SessionStore>,
    catalog: Option<Arc<dyn CatalogSearch>>,
}

impl DialogueEngine {
    pub fn builder(schema: Arc<SchemaConfig>) -> DialogueEngineBuilder {
        DialogueEngineBuilder::new(schema)
    }

    pub fn matcher(&self) -> &Arc<PatternMatcher> {
        &self.matcher
    }

    pub fn knowledge_base(&self) -> &Arc<SpecialCaseKnowledgeBase> {
        &self.kb
    }

    pub fn policy(&self) -> &DialoguePolicy {
        &self.policy
    }

    async fn load_or_new(&self, session_id: &str) -> Result<SessionState> {
        match self.sessions.load(session_id).await? {
            Some(state) => Ok(state),
            None => {
                // an expired session may have left loop tracking behind
                self.kb.clear_session(session_id);
                Ok(SessionState::new(session_id))
            },
        }
    }

    /// Process one user utterance
    pub async fn process_turn(&self, session_id: &str, text: &str) -> Result<TurnOutcome> {
        let mut state = self.load_or_new(session_id).await?;

        if text.trim().is_empty() {
            tracing::debug!(session_id, "Empty input, re-asking");
            let action = self.policy.peek(&state);
            return Ok(TurnOutcome {
                session_id: session_id.to_string(),
                success: false,
                response: action.response().to_string(),
                action,
                stage: state.stage,
                extraction: None,
                changes: Vec::new(),
                slots: state.slot_map(),
                forced: None,
            });
        }

        let previous_stage = state.stage;
        state.push_turn(Turn::user(text));
        let turn = state.user_turn_count();
        let repeats = state.record_query(advisor_text_processing::query_hash(text));

        let extraction = self.extractor.extract_for_session(text, &state).await;

        let mut changes: Vec<StateChange> = extraction
            .extracted_slots
            .values()
            .filter_map(|result| apply_match(&mut state, result, turn))
            .collect();
        let just_filled: Vec<String> = changes.iter().map(|c| c.slot_name.clone()).collect();
        if let Some(case_id) = &extraction.case_id {
            state.note_special_case(case_id);
        }

        let decision = self.policy.decide(&mut state, &extraction, &just_filled, repeats);
        changes.extend(decision.changes);

        self.kb.observe_stage(session_id, state.stage);
        if let Some(case_id) = &extraction.case_id {
            if !just_filled.is_empty() || state.stage != previous_stage {
                self.kb.record_success(case_id);
            }
        }

        if let (Some(request), Some(catalog)) = (decision.action.search_request(), &self.catalog) {
            if let Err(e) = catalog.submit(request).await {
                tracing::warn!(session_id, error = %e, "Catalog search failed");
            }
        }

        let response = decision.action.response().to_string();
        state.push_turn(Turn::assistant(&response));
        self.sessions.save(&state).await?;

        tracing::info!(
            session_id,
            turn,
            stage = %state.stage,
            filled = state.filled_slots().len(),
            method = ?extraction.extraction_method,
            "Turn processed"
        );

        Ok(TurnOutcome {
            session_id: session_id.to_string(),
            success: extraction.success,
            action: decision.action,
            stage: state.stage,
            changes,
            slots: state.slot_map(),
            forced: decision.forced,
            extraction: Some(extraction),
            response,
        })
    }

    /// Next action for a session without processing input
    pub async fn next_action(&self, session_id: &str) -> Result<DialogueAction> {
        let state = self.load_or_new(session_id).await?;
        Ok(self.policy.peek(&state))
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(self.sessions.load(session_id).await?)
    }

    /// Drop expired sessions and their loop tracking, returning how many
    /// were removed
    pub async fn purge_expired_sessions(&self) -> Result<usize> {
        let expired = self.sessions.purge_expired().await?;
        for session_id in &expired {
            self.kb.clear_session(session_id);
        }
        if !expired.is_empty() {
            tracing::info!(purged = expired.len(), tracked = self.kb.tracked_sessions(), "Expired sessions purged");
        }
        Ok(expired.len())
    }

    /// Drop a session and its loop tracking
    pub async fn reset_session(&self, session_id: &str) -> Result<()> {
        self.sessions.delete(session_id).await?;
        self.kb.clear_session(session_id);
        tracing::debug!(session_id, "Session reset");
        Ok(())
    }
}

/// Builder for [`DialogueEngine`]
pub struct DialogueEngineBuilder {
    schema: Arc<SchemaConfig>,
    settings: Settings,
    cases: SpecialCasesConfig,
    classifier: Option<Arc<dyn SlotClassifier>>,
    sessions: Option<Arc<dyn SessionStore>>,
    catalog: Option<Arc<dyn CatalogSearch>>,
    learned_store: Option<Arc<dyn LearnedPatternStore>>,
}

impl DialogueEngineBuilder {
    pub fn new(schema: Arc<SchemaConfig>) -> Self {
        Self {
            schema,
            settings: Settings::default(),
            cases: SpecialCasesConfig::default(),
            classifier: None,
            sessions: None,
            catalog: None,
            learned_store: None,
        }
    }

    /// Builder wired from runtime settings: schema and case files, learned
    /// pattern store
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let schema = Arc::new(SchemaConfig::load(&settings.schema_path)?);
        let cases = SpecialCasesConfig::load(&settings.special_cases_path)?;

        let mut builder = Self::new(schema)
            .special_cases(cases)
            .settings(settings.clone());
        if let Some(path) = &settings.learning.store_path {
            builder = builder.learned_store(Arc::new(JsonFilePatternStore::new(path)));
        }
        Ok(builder)
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn special_cases(mut self, cases: SpecialCasesConfig) -> Self {
        self.cases = cases;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn SlotClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogSearch>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn learned_store(mut self, store: Arc<dyn LearnedPatternStore>) -> Self {
        self.learned_store = Some(store);
        self
    }

    pub fn build(self) -> Result<DialogueEngine> {
        self.cases.validate_against(&self.schema)?;

        let matcher = match self.learned_store {
            Some(store) => PatternMatcher::with_store(Arc::clone(&self.schema), store)?,
            None => PatternMatcher::new(Arc::clone(&self.schema)),
        };
        let matcher = Arc::new(matcher.with_learned_confidence(self.settings.learning.learned_confidence));

        let issues = matcher.validate_patterns();
        if !issues.is_empty() {
            tracing::warn!(count = issues.len(), "Some stored patterns failed to compile and are skipped");
        }

        let kb = Arc::new(SpecialCaseKnowledgeBase::new(&self.cases));
        let extractor = MultiStrategyExtractor::standard(
            Arc::clone(&matcher),
            Arc::clone(&kb),
            self.classifier,
            &self.settings.extractor,
            self.settings.learning.enabled,
        );
        if extractor.strategy_names().is_empty() {
            return Err(AgentError::Initialization("no extraction strategies".to_string()));
        }

        tracing::info!(
            schema = %self.schema.metadata.name,
            slots = self.schema.slots.len(),
            cases = kb.case_count(),
            strategies = ?extractor.strategy_names(),
            "Dialogue engine ready"
        );

        Ok(DialogueEngine {
            policy: DialoguePolicy::new(Arc::clone(&matcher)),
            matcher,
            extractor,
            kb,
            sessions: self
                .sessions
                .unwrap_or_else(|| Arc::new(InMemorySessionStore::new())),
            catalog: self.catalog,
        })
    }
}
